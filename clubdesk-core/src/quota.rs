//! Quota admission control
//!
//! Tracks license consumption against a club's configured allotment and
//! classifies each incoming creation as admitted (free) or overflow (must be
//! paid). Soft-deleted licenses never count; status-specific counts match
//! every historical spelling of the state via the status alias table.
//!
//! Quota reads taken outside the creation workflow's lock are advisory only:
//! the admission decision is always re-taken inside the locked transaction,
//! on the same connection that performs the insert, so two concurrent
//! requests cannot both claim the last free slot.

use sqlx::PgConnection;

use crate::error::{CoreError, CoreResult};
use crate::schema::{resolve_column, resolve_table, Entity};
use crate::status::LicenseStatus;

/// Snapshot of a club's license allotment
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QuotaInfo {
    /// Configured allotment
    pub total: u32,

    /// Live (not soft-deleted) licenses
    pub used: u32,

    /// `max(0, total - used)`
    pub remaining: u32,
}

impl QuotaInfo {
    /// Builds a snapshot, clamping `remaining` at zero
    pub fn new(total: u32, used: u32) -> Self {
        QuotaInfo {
            total,
            used,
            remaining: total.saturating_sub(used),
        }
    }
}

/// Admission decision for one license creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Admission {
    /// A free slot exists; the license is created draft
    Admitted,

    /// Quota exhausted; the license is created pending payment and handed
    /// off to the payment collaborator
    Overflow,
}

/// Computes total/used/remaining for a club
///
/// Run this on the locked transaction's connection when the result feeds an
/// admission decision.
///
/// # Errors
///
/// Returns [`CoreError::ClubNotFound`] if the club does not exist.
pub async fn quota_info(conn: &mut PgConnection, club_id: i64) -> CoreResult<QuotaInfo> {
    let quota_col = resolve_column(Entity::Club, "quota").unwrap_or("license_quota");
    let clubs = resolve_table(Entity::Club);

    let total: Option<(i32,)> =
        sqlx::query_as(&format!("SELECT {quota_col} FROM {clubs} WHERE id = $1"))
            .bind(club_id)
            .fetch_optional(&mut *conn)
            .await?;

    let Some((total,)) = total else {
        return Err(CoreError::ClubNotFound(club_id));
    };

    let used = count_live_licenses(conn, club_id).await?;

    Ok(QuotaInfo::new(total.max(0) as u32, used))
}

/// Decides whether a new license is admitted free or overflows to payment
pub async fn admit(conn: &mut PgConnection, club_id: i64) -> CoreResult<(Admission, QuotaInfo)> {
    let info = quota_info(conn, club_id).await?;
    let admission = if info.remaining > 0 {
        Admission::Admitted
    } else {
        Admission::Overflow
    };

    Ok((admission, info))
}

/// Counts a club's live licenses (any status)
async fn count_live_licenses(conn: &mut PgConnection, club_id: i64) -> CoreResult<u32> {
    let licenses = resolve_table(Entity::License);
    let club_col = resolve_column(Entity::License, "club").unwrap_or("club_id");
    let deleted_col = resolve_column(Entity::License, "deleted").unwrap_or("deleted_at");

    let (count,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM {licenses} WHERE {club_col} = $1 AND {deleted_col} IS NULL"
    ))
    .bind(club_id)
    .fetch_one(conn)
    .await?;

    Ok(count.max(0) as u32)
}

/// Counts a club's live licenses in one canonical state
///
/// Matches every historical spelling of the state, so "valide", "validee",
/// "active" and "applied" all count as committed.
pub async fn count_with_status(
    conn: &mut PgConnection,
    club_id: i64,
    status: &LicenseStatus,
) -> CoreResult<u32> {
    let licenses = resolve_table(Entity::License);
    let club_col = resolve_column(Entity::License, "club").unwrap_or("club_id");
    let status_col = resolve_column(Entity::License, "status").unwrap_or("raw_status");
    let deleted_col = resolve_column(Entity::License, "deleted").unwrap_or("deleted_at");

    let spellings = status.db_statuses();
    let placeholders: Vec<String> = (0..spellings.len()).map(|i| format!("${}", i + 2)).collect();
    let query = format!(
        "SELECT COUNT(*) FROM {licenses} \
         WHERE {club_col} = $1 AND {deleted_col} IS NULL \
           AND LOWER(TRIM({status_col})) IN ({})",
        placeholders.join(", ")
    );

    let mut q = sqlx::query_as::<_, (i64,)>(&query).bind(club_id);
    for spelling in &spellings {
        q = q.bind(*spelling);
    }

    let (count,) = q.fetch_one(conn).await?;
    Ok(count.max(0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_info_remaining_never_negative() {
        let info = QuotaInfo::new(2, 5);
        assert_eq!(info.total, 2);
        assert_eq!(info.used, 5);
        assert_eq!(info.remaining, 0);
    }

    #[test]
    fn test_quota_info_with_free_slots() {
        let info = QuotaInfo::new(10, 3);
        assert_eq!(info.remaining, 7);
    }

    #[test]
    fn test_quota_info_zero_allotment() {
        let info = QuotaInfo::new(0, 0);
        assert_eq!(info.remaining, 0);
    }
}
