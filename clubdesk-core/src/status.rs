//! License status state machine
//!
//! The data store carries a decade of historical status spellings (French and
//! English, several generations of admin tooling). This module maps the raw
//! strings onto a small canonical set and answers the two questions every
//! mutation path must ask: "what state is this really in?" and "is it still
//! editable?".
//!
//! # Canonical states
//!
//! ```text
//! draft → pending → committed
//!             ↘ rejected
//!             ↘ deactivated   (also reachable from committed)
//! ```
//!
//! `draft` and `pending` are the two "not yet final" states; once a license
//! is committed (paid or validated) it becomes read-only to the owner.
//!
//! Unknown raw values pass through as their own bucket rather than erroring:
//! legacy rows are known to contain free-form strings, and a hard failure on
//! read would make those rows unreachable. A warning is logged so they stay
//! visible in observability.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Raw spellings that normalize to `Draft`
const DRAFT_ALIASES: &[&str] = &["draft", "brouillon"];

/// Raw spellings that normalize to `Pending`
const PENDING_ALIASES: &[&str] = &[
    "pending",
    "en_attente",
    "attente",
    "pending_payment",
    "attente_paiement",
];

/// Raw spellings that normalize to `Committed`
const COMMITTED_ALIASES: &[&str] = &[
    "committed",
    "valide",
    "validee",
    "active",
    "applied",
    "paid",
    "payee",
];

/// Raw spellings that normalize to `Rejected`
const REJECTED_ALIASES: &[&str] = &["rejected", "refuse", "refusee"];

/// Raw spellings that normalize to `Deactivated`
const DEACTIVATED_ALIASES: &[&str] = &["deactivated", "desactive", "desactivee", "inactive"];

/// Canonical license lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    /// Freshly created, not yet submitted or charged
    Draft,

    /// Awaiting payment or administrative validation
    Pending,

    /// Paid or validated; read-only to the owner from here on
    Committed,

    /// Administratively rejected
    Rejected,

    /// Administratively deactivated
    Deactivated,

    /// Unrecognized legacy value, preserved verbatim as its own bucket
    #[serde(untagged)]
    Other(String),
}

impl LicenseStatus {
    /// Canonical string for database storage
    pub fn as_str(&self) -> &str {
        match self {
            LicenseStatus::Draft => "draft",
            LicenseStatus::Pending => "pending",
            LicenseStatus::Committed => "committed",
            LicenseStatus::Rejected => "rejected",
            LicenseStatus::Deactivated => "deactivated",
            LicenseStatus::Other(raw) => raw,
        }
    }

    /// Normalizes a raw status string to its canonical state
    ///
    /// Lookup is trimmed and case-insensitive. Unrecognized values are kept
    /// as [`LicenseStatus::Other`] with a warning, never rejected.
    ///
    /// # Example
    ///
    /// ```
    /// use clubdesk_core::status::LicenseStatus;
    ///
    /// assert_eq!(LicenseStatus::normalize("Validee"), LicenseStatus::Committed);
    /// assert_eq!(LicenseStatus::normalize(" brouillon "), LicenseStatus::Draft);
    /// assert_eq!(
    ///     LicenseStatus::normalize("archived-2009"),
    ///     LicenseStatus::Other("archived-2009".to_string())
    /// );
    /// ```
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lowered = trimmed.to_lowercase();
        let key = lowered.as_str();

        if DRAFT_ALIASES.contains(&key) {
            LicenseStatus::Draft
        } else if PENDING_ALIASES.contains(&key) {
            LicenseStatus::Pending
        } else if COMMITTED_ALIASES.contains(&key) {
            LicenseStatus::Committed
        } else if REJECTED_ALIASES.contains(&key) {
            LicenseStatus::Rejected
        } else if DEACTIVATED_ALIASES.contains(&key) {
            LicenseStatus::Deactivated
        } else {
            warn!(raw = trimmed, "unrecognized license status, passing through");
            LicenseStatus::Other(trimmed.to_string())
        }
    }

    /// Checks whether the license may still be edited by its owner
    ///
    /// True only for `Draft` and `Pending`. This is the single predicate all
    /// mutation entry points consult; callers that receive `false` must fall
    /// back to a read-only view of the record, not raise a hard error.
    pub fn is_editable(&self) -> bool {
        matches!(self, LicenseStatus::Draft | LicenseStatus::Pending)
    }

    /// Checks whether the state is final (no further owner action expected)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LicenseStatus::Committed | LicenseStatus::Rejected | LicenseStatus::Deactivated
        )
    }

    /// Every raw spelling that maps to this canonical state
    ///
    /// Used to build `WHERE status IN (...)` predicates for quota counting,
    /// which must match any historical spelling, not just the canonical one.
    /// An `Other` bucket matches only its own raw value.
    pub fn db_statuses(&self) -> Vec<&str> {
        match self {
            LicenseStatus::Draft => DRAFT_ALIASES.to_vec(),
            LicenseStatus::Pending => PENDING_ALIASES.to_vec(),
            LicenseStatus::Committed => COMMITTED_ALIASES.to_vec(),
            LicenseStatus::Rejected => REJECTED_ALIASES.to_vec(),
            LicenseStatus::Deactivated => DEACTIVATED_ALIASES.to_vec(),
            LicenseStatus::Other(raw) => vec![raw.as_str()],
        }
    }
}

/// Club lifecycle state
///
/// Clubs share the committed-gate behavior with licenses but have no draft
/// state: they are created pending and approved (committed) by an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClubStatus {
    Pending,
    Committed,
    Rejected,
    Deactivated,
}

impl ClubStatus {
    /// Canonical string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ClubStatus::Pending => "pending",
            ClubStatus::Committed => "committed",
            ClubStatus::Rejected => "rejected",
            ClubStatus::Deactivated => "deactivated",
        }
    }

    /// Parses the canonical string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ClubStatus::Pending),
            "committed" => Some(ClubStatus::Committed),
            "rejected" => Some(ClubStatus::Rejected),
            "deactivated" => Some(ClubStatus::Deactivated),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_committed_spellings() {
        for raw in ["valide", "validee", "active", "applied"] {
            let status = LicenseStatus::normalize(raw);
            assert_eq!(status, LicenseStatus::Committed, "raw = {raw}");
            assert!(!status.is_editable(), "raw = {raw}");
        }
    }

    #[test]
    fn test_normalize_draft() {
        let status = LicenseStatus::normalize("brouillon");
        assert_eq!(status, LicenseStatus::Draft);
        assert!(status.is_editable());
    }

    #[test]
    fn test_normalize_is_case_insensitive_and_trimmed() {
        assert_eq!(LicenseStatus::normalize("  VALIDE  "), LicenseStatus::Committed);
        assert_eq!(LicenseStatus::normalize("Pending_Payment"), LicenseStatus::Pending);
        assert_eq!(LicenseStatus::normalize("Refuse"), LicenseStatus::Rejected);
        assert_eq!(LicenseStatus::normalize("INACTIVE"), LicenseStatus::Deactivated);
    }

    #[test]
    fn test_unknown_raw_value_passes_through() {
        let status = LicenseStatus::normalize("migrated-1998");
        assert_eq!(status, LicenseStatus::Other("migrated-1998".to_string()));
        assert!(!status.is_editable());
        assert_eq!(status.db_statuses(), vec!["migrated-1998"]);
    }

    #[test]
    fn test_editable_only_before_commit() {
        assert!(LicenseStatus::Draft.is_editable());
        assert!(LicenseStatus::Pending.is_editable());
        assert!(!LicenseStatus::Committed.is_editable());
        assert!(!LicenseStatus::Rejected.is_editable());
        assert!(!LicenseStatus::Deactivated.is_editable());
    }

    #[test]
    fn test_db_statuses_round_trip() {
        for raw in LicenseStatus::Committed.db_statuses() {
            assert_eq!(LicenseStatus::normalize(raw), LicenseStatus::Committed);
        }
        for raw in LicenseStatus::Pending.db_statuses() {
            assert_eq!(LicenseStatus::normalize(raw), LicenseStatus::Pending);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!LicenseStatus::Draft.is_terminal());
        assert!(!LicenseStatus::Pending.is_terminal());
        assert!(LicenseStatus::Committed.is_terminal());
        assert!(LicenseStatus::Rejected.is_terminal());
        assert!(LicenseStatus::Deactivated.is_terminal());
    }

    #[test]
    fn test_club_status_round_trip() {
        for status in [
            ClubStatus::Pending,
            ClubStatus::Committed,
            ClubStatus::Rejected,
            ClubStatus::Deactivated,
        ] {
            assert_eq!(ClubStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(ClubStatus::from_str("bogus"), None);
    }
}
