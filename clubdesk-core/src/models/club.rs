//! Club model and database operations
//!
//! A club is the organizational entity that owns licenses. Every club is
//! managed by exactly one responsible user, enforced by a unique constraint
//! on `responsible_id`.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE clubs (
//!     id BIGSERIAL PRIMARY KEY,
//!     name VARCHAR(255) NOT NULL,
//!     region VARCHAR(100) NOT NULL,
//!     status VARCHAR(50) NOT NULL DEFAULT 'pending',
//!     responsible_id BIGINT NOT NULL UNIQUE,
//!     license_quota INTEGER NOT NULL DEFAULT 0 CHECK (license_quota >= 0),
//!     contact_email VARCHAR(255) NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! Clubs are created through the creation workflow (never directly by HTTP
//! handlers) so that the idempotency ledger and per-owner lock always apply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use validator::Validate;

use crate::status::ClubStatus;

/// Club row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Club {
    /// Store-assigned identity, immutable
    pub id: i64,

    /// Club name
    pub name: String,

    /// Administrative region
    pub region: String,

    /// Canonical lifecycle status
    pub status: String,

    /// User who manages this club
    pub responsible_id: i64,

    /// Configured license allotment (may be 0 before affiliation)
    pub license_quota: i32,

    /// Contact address for notifications
    pub contact_email: String,

    /// When the club was created
    pub created_at: DateTime<Utc>,

    /// When the club was last updated
    pub updated_at: DateTime<Utc>,
}

impl Club {
    /// Parsed lifecycle status
    pub fn get_status(&self) -> Option<ClubStatus> {
        ClubStatus::from_str(&self.status)
    }
}

/// Input for creating a new club
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewClub {
    /// Club name
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,

    /// Administrative region
    #[validate(length(min = 1, max = 100, message = "region must be 1-100 characters"))]
    pub region: String,

    /// Contact address
    #[validate(email(message = "contact_email must be a valid address"))]
    pub contact_email: String,

    /// Initial license allotment
    #[serde(default)]
    #[validate(range(min = 0, message = "license_quota must not be negative"))]
    pub license_quota: i32,
}

/// Contact fields a responsible user may change on a committed club
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ClubContactUpdate {
    /// New contact address
    #[validate(email(message = "contact_email must be a valid address"))]
    pub contact_email: Option<String>,
}

impl Club {
    /// Inserts a new club in pending state
    ///
    /// Must run inside the creation workflow's locked transaction; the
    /// unique constraint on `responsible_id` backs the one-club-per-owner
    /// invariant at the storage layer.
    pub async fn insert(
        conn: &mut PgConnection,
        responsible_id: i64,
        data: &NewClub,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Club>(
            r#"
            INSERT INTO clubs (name, region, responsible_id, license_quota, contact_email)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, region, status, responsible_id, license_quota,
                      contact_email, created_at, updated_at
            "#,
        )
        .bind(&data.name)
        .bind(&data.region)
        .bind(responsible_id)
        .bind(data.license_quota)
        .bind(&data.contact_email)
        .fetch_one(conn)
        .await
    }

    /// Finds a club by ID
    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Club>(
            r#"
            SELECT id, name, region, status, responsible_id, license_quota,
                   contact_email, created_at, updated_at
            FROM clubs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Finds the club managed by a user, if any
    pub async fn find_by_responsible(
        conn: &mut PgConnection,
        responsible_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Club>(
            r#"
            SELECT id, name, region, status, responsible_id, license_quota,
                   contact_email, created_at, updated_at
            FROM clubs
            WHERE responsible_id = $1
            "#,
        )
        .bind(responsible_id)
        .fetch_optional(conn)
        .await
    }

    /// Sets the lifecycle status (administrative action)
    ///
    /// # Returns
    ///
    /// The updated club, or None if the club does not exist.
    pub async fn set_status(
        conn: &mut PgConnection,
        id: i64,
        status: ClubStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Club>(
            r#"
            UPDATE clubs
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, region, status, responsible_id, license_quota,
                      contact_email, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(conn)
        .await
    }

    /// Updates contact fields
    ///
    /// The only mutation a responsible user retains once the club is
    /// committed. No-op when every field is None.
    pub async fn update_contact(
        conn: &mut PgConnection,
        id: i64,
        data: &ClubContactUpdate,
    ) -> Result<Option<Self>, sqlx::Error> {
        let Some(email) = &data.contact_email else {
            return Self::find_by_id(conn, id).await;
        };

        sqlx::query_as::<_, Club>(
            r#"
            UPDATE clubs
            SET contact_email = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, region, status, responsible_id, license_quota,
                      contact_email, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(email)
        .fetch_optional(conn)
        .await
    }

    /// Updates the configured license allotment (administrative action)
    pub async fn set_quota(
        conn: &mut PgConnection,
        id: i64,
        license_quota: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Club>(
            r#"
            UPDATE clubs
            SET license_quota = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, region, status, responsible_id, license_quota,
                      contact_email, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(license_quota)
        .fetch_optional(conn)
        .await
    }

    /// Lists clubs with pagination, newest first
    pub async fn list(
        conn: &mut PgConnection,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Club>(
            r#"
            SELECT id, name, region, status, responsible_id, license_quota,
                   contact_email, created_at, updated_at
            FROM clubs
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(conn)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_club_validation_passes() {
        let club = NewClub {
            name: "AS Rivière".to_string(),
            region: "Nouvelle-Aquitaine".to_string(),
            contact_email: "contact@asriviere.example".to_string(),
            license_quota: 5,
        };
        assert!(club.validate().is_ok());
    }

    #[test]
    fn test_new_club_validation_reports_all_violations() {
        let club = NewClub {
            name: String::new(),
            region: String::new(),
            contact_email: "not-an-email".to_string(),
            license_quota: 0,
        };
        let errors = club.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));
        assert!(errors.field_errors().contains_key("region"));
        assert!(errors.field_errors().contains_key("contact_email"));
    }

    #[test]
    fn test_get_status_parses_canonical_value() {
        let club = Club {
            id: 1,
            name: "Test".to_string(),
            region: "R".to_string(),
            status: "committed".to_string(),
            responsible_id: 7,
            license_quota: 2,
            contact_email: "c@example.org".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(club.get_status(), Some(ClubStatus::Committed));
    }
}
