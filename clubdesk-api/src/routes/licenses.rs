/// License endpoints
///
/// License creation goes through the core creation workflow (per-club
/// advisory lock, idempotent ledger, quota admission); edits, deletion, and
/// status callbacks talk to the model layer and workflow directly.
///
/// # Example Response (creation, quota exhausted)
///
/// ```json
/// {
///   "license": {
///     "id": 31,
///     "club_id": 12,
///     "status": "pending",
///     "editable": true
///   },
///   "admission": "overflow",
///   "quota": { "total": 20, "used": 21, "remaining": 0 },
///   "payment_url": "https://pay.example.org/orders/88/checkout",
///   "replayed": false
/// }
/// ```

use crate::app::{ActorId, AppState};
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use clubdesk_core::error::CoreError;
use clubdesk_core::models::{Club, EditOutcome, License, LicenseUpdate, NewLicense};
use clubdesk_core::quota::{Admission, QuotaInfo};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use validator::Validate;

/// License representation returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct LicenseResponse {
    pub id: i64,
    pub club_id: i64,
    pub holder_name: String,
    pub holder_email: String,

    /// Canonical status
    pub status: String,

    /// Status spelling as stored, for clients that track the raw value
    pub raw_status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_order_id: Option<i64>,

    /// Whether owner edits are still accepted
    pub editable: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<License> for LicenseResponse {
    fn from(license: License) -> Self {
        let editable = license.is_editable();
        let status = license.canonical_status().as_str().to_string();
        Self {
            id: license.id,
            club_id: license.club_id,
            holder_name: license.holder_name,
            holder_email: license.holder_email,
            status,
            raw_status: license.raw_status,
            payment_order_id: license.payment_order_id,
            editable,
            created_at: license.created_at,
            updated_at: license.updated_at,
        }
    }
}

/// License creation response
#[derive(Debug, Serialize)]
pub struct CreateLicenseResponse {
    /// The created (or replayed) license
    pub license: LicenseResponse,

    /// Whether the license was admitted free or routed to payment
    pub admission: Admission,

    /// Quota snapshot after the creation
    pub quota: QuotaInfo,

    /// Checkout URL when the overflow branch created a payment order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,

    /// True when an identical prior request already created the license
    pub replayed: bool,
}

/// License update response
#[derive(Debug, Serialize)]
pub struct UpdateLicenseResponse {
    /// Current license record
    pub license: LicenseResponse,

    /// False when the license was read-only and nothing changed
    pub updated: bool,
}

/// Pagination query parameters
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Status callback request body
#[derive(Debug, Deserialize)]
pub struct CommitLicenseRequest {
    /// Raw status spelling from the caller (payment service or back office)
    pub status: String,
}

/// Create license endpoint handler
///
/// `POST /v1/clubs/:id/licenses`
///
/// Restricted to the club's responsible user. Quota overflow is not an
/// error: the license is created pending payment and the response carries
/// the checkout URL.
///
/// # Errors
///
/// - 403 Forbidden: the actor is not responsible for the club
/// - 404 Not Found: unknown club
/// - 422 Unprocessable Entity: validation errors
/// - 503 Service Unavailable: lock contention
pub async fn create_license(
    State(state): State<AppState>,
    Extension(ActorId(actor_id)): Extension<ActorId>,
    Path(club_id): Path<i64>,
    Json(body): Json<NewLicense>,
) -> ApiResult<(StatusCode, Json<CreateLicenseResponse>)> {
    let creation = state
        .workflow
        .create_license(actor_id, club_id, &body)
        .await?;

    let status = if creation.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(CreateLicenseResponse {
            license: creation.license.into(),
            admission: creation.admission,
            quota: creation.quota,
            payment_url: creation.payment_url,
            replayed: creation.replayed,
        }),
    ))
}

/// List licenses endpoint handler
///
/// `GET /v1/clubs/:id/licenses`
///
/// Restricted to the club's responsible user. Soft-deleted licenses are
/// excluded.
pub async fn list_licenses(
    State(state): State<AppState>,
    Extension(ActorId(actor_id)): Extension<ActorId>,
    Path(club_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<LicenseResponse>>> {
    let mut conn = state.db.acquire().await?;
    require_responsible(&mut conn, club_id, actor_id).await?;

    let limit = query.limit.clamp(1, 200);
    let offset = query.offset.max(0);
    let licenses = License::list_for_club(&mut conn, club_id, limit, offset).await?;

    Ok(Json(licenses.into_iter().map(Into::into).collect()))
}

/// Get license endpoint handler
///
/// `GET /v1/licenses/:id`
///
/// Restricted to the responsible user of the license's club.
pub async fn get_license(
    State(state): State<AppState>,
    Extension(ActorId(actor_id)): Extension<ActorId>,
    Path(license_id): Path<i64>,
) -> ApiResult<Json<LicenseResponse>> {
    let mut conn = state.db.acquire().await?;
    let license = License::find_by_id(&mut conn, license_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("License {} not found", license_id)))?;

    require_responsible(&mut conn, license.club_id, actor_id).await?;

    Ok(Json(license.into()))
}

/// Update license endpoint handler
///
/// `PATCH /v1/licenses/:id`
///
/// Owner edit of holder fields. Once the license has left the editable
/// statuses the current record is returned unchanged with `updated: false`.
pub async fn update_license(
    State(state): State<AppState>,
    Extension(ActorId(actor_id)): Extension<ActorId>,
    Path(license_id): Path<i64>,
    Json(body): Json<LicenseUpdate>,
) -> ApiResult<Json<UpdateLicenseResponse>> {
    body.validate().map_err(CoreError::from_validation)?;

    let mut conn = state.db.acquire().await?;
    let license = License::find_by_id(&mut conn, license_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("License {} not found", license_id)))?;

    require_responsible(&mut conn, license.club_id, actor_id).await?;

    let outcome = License::apply_owner_edit(&mut conn, license_id, &body)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("License {} not found", license_id)))?;

    let response = match outcome {
        EditOutcome::Updated(license) => UpdateLicenseResponse {
            license: license.into(),
            updated: true,
        },
        EditOutcome::ReadOnly(license) => UpdateLicenseResponse {
            license: license.into(),
            updated: false,
        },
    };

    Ok(Json(response))
}

/// Commit license endpoint handler
///
/// `POST /v1/licenses/:id/commit`
///
/// Callback for the payment service and the back office. The raw status
/// spelling is preserved on the record; legacy spellings are accepted.
pub async fn commit_license(
    State(state): State<AppState>,
    Path(license_id): Path<i64>,
    Json(body): Json<CommitLicenseRequest>,
) -> ApiResult<Json<LicenseResponse>> {
    let license = state
        .workflow
        .commit_license(license_id, &body.status)
        .await?;

    Ok(Json(license.into()))
}

/// Delete license endpoint handler
///
/// `DELETE /v1/licenses/:id`
///
/// Soft delete; the license stops counting against the club's quota.
pub async fn delete_license(
    State(state): State<AppState>,
    Extension(ActorId(actor_id)): Extension<ActorId>,
    Path(license_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let mut conn = state.db.acquire().await?;
    let license = License::find_by_id(&mut conn, license_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("License {} not found", license_id)))?;

    require_responsible(&mut conn, license.club_id, actor_id).await?;

    let deleted = License::soft_delete(&mut conn, license_id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!(
            "License {} not found",
            license_id
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Checks that the actor is the responsible user of the club
async fn require_responsible(
    conn: &mut PgConnection,
    club_id: i64,
    actor_id: i64,
) -> Result<(), ApiError> {
    let club = Club::find_by_id(conn, club_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Club {} not found", club_id)))?;

    if club.responsible_id != actor_id {
        return Err(ApiError::Forbidden(
            "Only the responsible user may access this resource".to_string(),
        ));
    }

    Ok(())
}
