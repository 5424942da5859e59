//! Error types for the clubdesk core
//!
//! All fallible core operations return `Result<T, CoreError>`. The taxonomy
//! distinguishes caller mistakes (validation, permission), lock-acquisition
//! failure, transient storage conflicts that the coordinator retries, and
//! everything else the storage layer can produce.
//!
//! Idempotent replay and quota overflow are deliberately *not* errors: they
//! are success variants carried on the workflow result types.

use thiserror::Error;

/// Core result type alias
pub type CoreResult<T> = Result<T, CoreError>;

/// A single violated field constraint
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldError {
    /// Field that failed validation
    pub field: String,

    /// Human-readable constraint description
    pub message: String,
}

/// Unified error type for core operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// One or more required attributes are missing or malformed.
    ///
    /// Raised before any lock is taken; carries every violated field so the
    /// caller can fix them all at once.
    #[error("validation failed: {} field(s)", .0.len())]
    Validation(Vec<FieldError>),

    /// The acting user lacks authority over the target resource
    #[error("permission denied: {0}")]
    Permission(String),

    /// The request conflicts with existing state (e.g. the owner already
    /// manages a different club)
    #[error("conflict: {0}")]
    Conflict(String),

    /// The advisory lock could not be acquired within the wait budget.
    /// Not retried within a single call.
    #[error("could not acquire lock '{key}' within {timeout_ms} ms")]
    LockTimeout { key: String, timeout_ms: u64 },

    /// A transient storage conflict persisted through every retry attempt
    #[error("storage conflict persisted after {attempts} attempts")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    /// Referenced club does not exist
    #[error("club not found: {0}")]
    ClubNotFound(i64),

    /// Referenced license does not exist
    #[error("license not found: {0}")]
    LicenseNotFound(i64),

    /// Any other storage failure, rolled back and surfaced immediately
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl CoreError {
    /// Builds a validation error from validator's output
    pub fn from_validation(errors: validator::ValidationErrors) -> Self {
        let mut fields = Vec::new();
        for (field, violations) in errors.field_errors() {
            for violation in violations {
                let message = violation
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("failed constraint '{}'", violation.code));
                fields.push(FieldError {
                    field: field.to_string(),
                    message,
                });
            }
        }
        CoreError::Validation(fields)
    }

    /// Checks whether this error is a transient storage conflict worth
    /// retrying (deadlock, lock-wait timeout, serialization failure).
    ///
    /// Classification is by PostgreSQL SQLSTATE:
    /// - `40001` serialization_failure
    /// - `40P01` deadlock_detected
    /// - `55P03` lock_not_available
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Storage(err) => is_retryable_sqlx(err),
            _ => false,
        }
    }
}

/// SQLSTATE-based retryability check on a raw sqlx error
pub(crate) fn is_retryable_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some("40001") | Some("40P01") | Some("55P03")
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = CoreError::Validation(vec![
            FieldError {
                field: "name".to_string(),
                message: "required".to_string(),
            },
            FieldError {
                field: "contact_email".to_string(),
                message: "not a valid email".to_string(),
            },
        ]);
        assert_eq!(err.to_string(), "validation failed: 2 field(s)");
    }

    #[test]
    fn test_lock_timeout_display() {
        let err = CoreError::LockTimeout {
            key: "club_creation_42".to_string(),
            timeout_ms: 10_000,
        };
        assert!(err.to_string().contains("club_creation_42"));
        assert!(err.to_string().contains("10000"));
    }

    #[test]
    fn test_non_storage_errors_are_not_retryable() {
        assert!(!CoreError::Permission("not the owner".into()).is_retryable());
        assert!(!CoreError::ClubNotFound(1).is_retryable());
        assert!(!CoreError::LockTimeout {
            key: "k".into(),
            timeout_ms: 1
        }
        .is_retryable());
    }

    #[test]
    fn test_plain_io_storage_error_is_not_retryable() {
        let err = CoreError::Storage(sqlx::Error::RowNotFound);
        assert!(!err.is_retryable());
    }
}
