//! Database models
//!
//! - `club`: organizational entity that owns licenses
//! - `license`: dependent record counted against the club quota
//! - `event`: idempotent creation-event ledger

pub mod club;
pub mod event;
pub mod license;

pub use club::{Club, ClubContactUpdate, NewClub};
pub use event::{derive_event_key, CreationEvent, EventStatus};
pub use license::{EditOutcome, License, LicenseUpdate, NewLicense};
