//! Idempotent creation-event ledger
//!
//! Every creation attempt writes a row keyed by a deterministic fingerprint
//! of the operation, the initiating owner, and the content being created.
//! The unique constraint on `event_key` means a retried request (double form
//! submission, browser back-button, client retry) collides with the original
//! attempt instead of creating a second resource; the workflow then replays
//! the stored `resource_id`.
//!
//! The per-owner advisory lock already serializes *concurrent* attempts;
//! the ledger covers the sequential case where a duplicate arrives after the
//! original attempt committed. Rows are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use sqlx::{PgConnection, PgPool};


/// Ledger row status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Attempt in flight (only observable inside its own transaction, or
    /// left behind by a crash between rollback and the failure mark)
    Pending,

    /// Attempt committed; `resource_id` holds the created resource
    Completed,

    /// Attempt rolled back; the key may be retried
    Failed,
}

impl EventStatus {
    /// String for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Completed => "completed",
            EventStatus::Failed => "failed",
        }
    }

    /// Parses the stored string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EventStatus::Pending),
            "completed" => Some(EventStatus::Completed),
            "failed" => Some(EventStatus::Failed),
            _ => None,
        }
    }
}

/// Ledger row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CreationEvent {
    /// Row identity
    pub id: i64,

    /// Deterministic operation fingerprint, globally unique
    pub event_key: String,

    /// Operation type (e.g. "club_creation", "license_creation")
    pub event_type: String,

    /// Serialized creation payload for audit/debugging
    pub payload: JsonValue,

    /// Attempt status
    pub status: String,

    /// Created resource, set when the attempt completes
    pub resource_id: Option<i64>,

    /// When the attempt was first recorded
    pub created_at: DateTime<Utc>,

    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
}

impl CreationEvent {
    /// Parsed attempt status
    pub fn get_status(&self) -> Option<EventStatus> {
        EventStatus::from_str(&self.status)
    }
}

/// Derives a deterministic event key
///
/// `sha256(operation_type | owner_id | fingerprint)`, hex-encoded. Two
/// requests with identical content from the same owner collide; any change
/// to the content produces a different key.
pub fn derive_event_key(operation_type: &str, owner_id: i64, fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(operation_type.as_bytes());
    hasher.update(b"|");
    hasher.update(owner_id.to_be_bytes());
    hasher.update(b"|");
    hasher.update(fingerprint.as_bytes());
    hex::encode(hasher.finalize())
}

impl CreationEvent {
    /// Records a pending attempt under the key
    ///
    /// Runs inside the locked transaction. Upserts so a row left behind by
    /// an earlier failed attempt is reclaimed in place; an INSERT that
    /// raised a unique-key violation would abort the enclosing transaction
    /// and poison every statement after it.
    pub async fn record(
        conn: &mut PgConnection,
        event_key: &str,
        event_type: &str,
        payload: &JsonValue,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, CreationEvent>(
            r#"
            INSERT INTO creation_events (event_key, event_type, payload, status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (event_key) DO UPDATE
            SET status = 'pending', updated_at = NOW()
            RETURNING id, event_key, event_type, payload, status, resource_id,
                      created_at, updated_at
            "#,
        )
        .bind(event_key)
        .bind(event_type)
        .bind(payload)
        .fetch_one(conn)
        .await
    }

    /// Looks up an attempt by key
    pub async fn find_by_key(
        conn: &mut PgConnection,
        event_key: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, CreationEvent>(
            r#"
            SELECT id, event_key, event_type, payload, status, resource_id,
                   created_at, updated_at
            FROM creation_events
            WHERE event_key = $1
            "#,
        )
        .bind(event_key)
        .fetch_optional(conn)
        .await
    }

    /// Checks whether an attempt with this key exists
    pub async fn exists(conn: &mut PgConnection, event_key: &str) -> Result<bool, sqlx::Error> {
        let (found,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM creation_events WHERE event_key = $1)",
        )
        .bind(event_key)
        .fetch_one(conn)
        .await?;

        Ok(found)
    }

    /// Marks an attempt completed and stores the created resource
    pub async fn mark_completed(
        conn: &mut PgConnection,
        event_key: &str,
        resource_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE creation_events \
             SET status = 'completed', resource_id = $2, updated_at = NOW() \
             WHERE event_key = $1",
        )
        .bind(event_key)
        .bind(resource_id)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Marks an attempt failed, best effort, outside the rolled-back
    /// transaction
    ///
    /// The in-flight transaction that recorded the attempt rolls back with
    /// the insert it guarded, so the failure mark needs its own connection.
    /// An error here is logged by the caller and never propagated: the
    /// workflow already failed for the real reason.
    pub async fn mark_failed(
        pool: &PgPool,
        event_key: &str,
        event_type: &str,
        payload: &JsonValue,
        reason: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO creation_events (event_key, event_type, payload, status)
            VALUES ($1, $2, $3 || jsonb_build_object('failure_reason', $4::text), 'failed')
            ON CONFLICT (event_key) DO UPDATE
            SET status = 'failed',
                payload = creation_events.payload
                    || jsonb_build_object('failure_reason', $4::text),
                updated_at = NOW()
            "#,
        )
        .bind(event_key)
        .bind(event_type)
        .bind(payload)
        .bind(reason)
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_key_is_deterministic() {
        let a = derive_event_key("club_creation", 42, "as riviere");
        let b = derive_event_key("club_creation", 42, "as riviere");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_event_key_varies_with_every_input() {
        let base = derive_event_key("club_creation", 42, "as riviere");
        assert_ne!(base, derive_event_key("license_creation", 42, "as riviere"));
        assert_ne!(base, derive_event_key("club_creation", 43, "as riviere"));
        assert_ne!(base, derive_event_key("club_creation", 42, "as riviere 2"));
    }

    #[test]
    fn test_event_status_round_trip() {
        for status in [EventStatus::Pending, EventStatus::Completed, EventStatus::Failed] {
            assert_eq!(EventStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(EventStatus::from_str("unknown"), None);
    }
}
