//! # ClubDesk Core Library
//!
//! This crate contains the club and license lifecycle core used by the
//! ClubDesk API server: the advisory-lock transaction coordinator, the
//! idempotent creation-event ledger, quota admission, the license status
//! machine, and the creation workflow that ties them together.
//!
//! ## Module Organization
//!
//! - `models`: Database models (clubs, licenses, creation events)
//! - `lock`: Advisory-lock transaction coordinator with retry
//! - `quota`: Quota admission decisions
//! - `status`: License status normalization and the editability rules
//! - `workflow`: Creation workflow orchestrator
//! - `collaborators`: External side-effect traits (audit, notify, payment)
//! - `schema`: Logical-to-physical name resolution for built queries
//! - `db`: Pool construction and migrations
//! - `error`: Common error types

pub mod collaborators;
pub mod db;
pub mod error;
pub mod lock;
pub mod models;
pub mod quota;
pub mod schema;
pub mod status;
pub mod workflow;

/// Current version of the ClubDesk core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
