//! License model and database operations
//!
//! A license belongs to exactly one club and counts against that club's
//! quota while not soft-deleted. The row keeps two status columns: `status`
//! holds the canonical state, `raw_status` preserves the spelling as written
//! because decades of imports left many historical variants behind and
//! downstream exports still expect them.
//!
//! Owner edits are gated by [`LicenseStatus::is_editable`]: once a license
//! is committed (paid or validated) the owner gets the current record back
//! read-only instead of an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use validator::Validate;

use crate::status::LicenseStatus;

/// License row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct License {
    /// Store-assigned identity
    pub id: i64,

    /// Owning club
    pub club_id: i64,

    /// License holder's name
    pub holder_name: String,

    /// License holder's contact address
    pub holder_email: String,

    /// Canonical lifecycle status
    pub status: String,

    /// Status spelling as originally written
    pub raw_status: String,

    /// Payment order covering this license, if it went through overflow
    pub payment_order_id: Option<i64>,

    /// Soft-deletion marker; deleted rows stop counting against quota
    pub deleted_at: Option<DateTime<Utc>>,

    /// When the license was created
    pub created_at: DateTime<Utc>,

    /// When the license was last updated
    pub updated_at: DateTime<Utc>,
}

impl License {
    /// Canonical status, normalized from the raw spelling
    pub fn canonical_status(&self) -> LicenseStatus {
        LicenseStatus::normalize(&self.raw_status)
    }

    /// Whether the owner may still edit this license
    pub fn is_editable(&self) -> bool {
        self.canonical_status().is_editable()
    }
}

/// Input for creating a new license
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewLicense {
    /// License holder's name
    #[validate(length(min = 1, max = 255, message = "holder_name must be 1-255 characters"))]
    pub holder_name: String,

    /// License holder's contact address
    #[validate(email(message = "holder_email must be a valid address"))]
    pub holder_email: String,
}

/// Owner-editable fields
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct LicenseUpdate {
    /// New holder name
    #[validate(length(min = 1, max = 255, message = "holder_name must be 1-255 characters"))]
    pub holder_name: Option<String>,

    /// New holder contact address
    #[validate(email(message = "holder_email must be a valid address"))]
    pub holder_email: Option<String>,
}

/// Result of an owner edit attempt
///
/// A non-editable license is not an error: the caller receives the current
/// record and renders it read-only.
#[derive(Debug, Clone)]
pub enum EditOutcome {
    /// Fields were applied
    Updated(License),

    /// License is committed/rejected/deactivated; nothing was changed
    ReadOnly(License),
}

impl License {
    /// Inserts a new license with the given canonical status
    ///
    /// Must run inside the creation workflow's locked transaction so the
    /// quota decision and the insert cannot race. `raw_status` is seeded
    /// with the canonical spelling for new rows.
    pub async fn insert(
        conn: &mut PgConnection,
        club_id: i64,
        data: &NewLicense,
        status: &LicenseStatus,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, License>(
            r#"
            INSERT INTO licenses (club_id, holder_name, holder_email, status, raw_status)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, club_id, holder_name, holder_email, status, raw_status,
                      payment_order_id, deleted_at, created_at, updated_at
            "#,
        )
        .bind(club_id)
        .bind(&data.holder_name)
        .bind(&data.holder_email)
        .bind(status.as_str())
        .fetch_one(conn)
        .await
    }

    /// Finds a license by ID (soft-deleted rows included)
    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, License>(
            r#"
            SELECT id, club_id, holder_name, holder_email, status, raw_status,
                   payment_order_id, deleted_at, created_at, updated_at
            FROM licenses
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Applies an owner edit, honoring the editability gate
    ///
    /// # Returns
    ///
    /// - `Ok(Some(EditOutcome::Updated))` when fields were applied
    /// - `Ok(Some(EditOutcome::ReadOnly))` when the license is no longer
    ///   editable (the record is returned unchanged)
    /// - `Ok(None)` when the license does not exist
    pub async fn apply_owner_edit(
        conn: &mut PgConnection,
        id: i64,
        data: &LicenseUpdate,
    ) -> Result<Option<EditOutcome>, sqlx::Error> {
        let Some(current) = Self::find_by_id(conn, id).await? else {
            return Ok(None);
        };

        if !current.is_editable() {
            return Ok(Some(EditOutcome::ReadOnly(current)));
        }

        let holder_name = data.holder_name.as_deref().unwrap_or(&current.holder_name);
        let holder_email = data
            .holder_email
            .as_deref()
            .unwrap_or(&current.holder_email);

        let updated = sqlx::query_as::<_, License>(
            r#"
            UPDATE licenses
            SET holder_name = $2, holder_email = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, club_id, holder_name, holder_email, status, raw_status,
                      payment_order_id, deleted_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(holder_name)
        .bind(holder_email)
        .fetch_one(conn)
        .await?;

        Ok(Some(EditOutcome::Updated(updated)))
    }

    /// Sets the lifecycle status from a raw spelling (administrative or
    /// payment-driven transition)
    ///
    /// The raw value is preserved verbatim and the canonical column is
    /// updated from its normalization.
    pub async fn set_status(
        conn: &mut PgConnection,
        id: i64,
        raw_status: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let canonical = LicenseStatus::normalize(raw_status);

        sqlx::query_as::<_, License>(
            r#"
            UPDATE licenses
            SET status = $2, raw_status = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, club_id, holder_name, holder_email, status, raw_status,
                      payment_order_id, deleted_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(canonical.as_str())
        .bind(raw_status.trim())
        .fetch_optional(conn)
        .await
    }

    /// Links a license to the payment order created for its overflow
    pub async fn set_payment_order(
        conn: &mut PgConnection,
        id: i64,
        payment_order_id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, License>(
            r#"
            UPDATE licenses
            SET payment_order_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, club_id, holder_name, holder_email, status, raw_status,
                      payment_order_id, deleted_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(payment_order_id)
        .fetch_optional(conn)
        .await
    }

    /// Soft-deletes a license so it stops counting against the quota
    ///
    /// # Returns
    ///
    /// True if a live row was marked, false if it was missing or already
    /// deleted.
    pub async fn soft_delete(conn: &mut PgConnection, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE licenses SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists a club's live licenses with pagination, newest first
    pub async fn list_for_club(
        conn: &mut PgConnection,
        club_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, License>(
            r#"
            SELECT id, club_id, holder_name, holder_email, status, raw_status,
                   payment_order_id, deleted_at, created_at, updated_at
            FROM licenses
            WHERE club_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(club_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(conn)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn license_with_raw_status(raw: &str) -> License {
        License {
            id: 1,
            club_id: 2,
            holder_name: "Jean Dupont".to_string(),
            holder_email: "jean@example.org".to_string(),
            status: LicenseStatus::normalize(raw).as_str().to_string(),
            raw_status: raw.to_string(),
            payment_order_id: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_legacy_spellings_gate_editability() {
        for raw in ["valide", "validee", "active", "applied"] {
            assert!(!license_with_raw_status(raw).is_editable(), "raw = {raw}");
        }
        assert!(license_with_raw_status("brouillon").is_editable());
        assert!(license_with_raw_status("pending_payment").is_editable());
    }

    #[test]
    fn test_new_license_validation() {
        let ok = NewLicense {
            holder_name: "Jean Dupont".to_string(),
            holder_email: "jean@example.org".to_string(),
        };
        assert!(ok.validate().is_ok());

        let bad = NewLicense {
            holder_name: String::new(),
            holder_email: "nope".to_string(),
        };
        let errors = bad.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("holder_name"));
        assert!(errors.field_errors().contains_key("holder_email"));
    }

    #[test]
    fn test_canonical_status_from_unknown_raw_value() {
        let license = license_with_raw_status("import-2003");
        assert_eq!(
            license.canonical_status(),
            LicenseStatus::Other("import-2003".to_string())
        );
        assert!(!license.is_editable());
    }
}
