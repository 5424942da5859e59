/// Club endpoints
///
/// Club creation goes through the core creation workflow (advisory lock,
/// idempotent ledger); reads and the contact update talk to the model layer
/// directly.
///
/// # Example Request
///
/// ```json
/// {
///   "name": "AS Riviere",
///   "region": "Brittany",
///   "contact_email": "contact@asriviere.example",
///   "license_quota": 20
/// }
/// ```
///
/// # Example Response
///
/// ```json
/// {
///   "club": {
///     "id": 12,
///     "name": "AS Riviere",
///     "status": "pending",
///     "license_quota": 20
///   },
///   "replayed": false
/// }
/// ```

use crate::app::{ActorId, AppState};
use crate::error::{ApiError, ApiResult};
use crate::routes::licenses::ListQuery;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use clubdesk_core::error::CoreError;
use clubdesk_core::models::{Club, ClubContactUpdate, NewClub};
use clubdesk_core::quota::{self, QuotaInfo};
use clubdesk_core::status::{ClubStatus, LicenseStatus};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Club representation returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct ClubResponse {
    pub id: i64,
    pub name: String,
    pub region: String,
    pub status: String,
    pub responsible_id: i64,
    pub license_quota: i32,
    pub contact_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Club> for ClubResponse {
    fn from(club: Club) -> Self {
        Self {
            id: club.id,
            name: club.name,
            region: club.region,
            status: club.status,
            responsible_id: club.responsible_id,
            license_quota: club.license_quota,
            contact_email: club.contact_email,
            created_at: club.created_at,
            updated_at: club.updated_at,
        }
    }
}

/// Club creation response
#[derive(Debug, Serialize)]
pub struct CreateClubResponse {
    /// The created (or replayed) club
    pub club: ClubResponse,

    /// True when an identical prior request already created the club
    pub replayed: bool,
}

/// Create club endpoint handler
///
/// `POST /v1/clubs`
///
/// Idempotent: repeating the request with the same club name returns the
/// original club with `replayed: true` and status 200 instead of 201.
///
/// # Errors
///
/// - 409 Conflict: the user already manages a different club
/// - 422 Unprocessable Entity: validation errors
/// - 503 Service Unavailable: lock contention
pub async fn create_club(
    State(state): State<AppState>,
    Extension(ActorId(actor_id)): Extension<ActorId>,
    Json(body): Json<NewClub>,
) -> ApiResult<(StatusCode, Json<CreateClubResponse>)> {
    let creation = state.workflow.create_club(actor_id, &body).await?;

    let status = if creation.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(CreateClubResponse {
            club: creation.club.into(),
            replayed: creation.replayed,
        }),
    ))
}

/// Get club endpoint handler
///
/// `GET /v1/clubs/:id`
pub async fn get_club(
    State(state): State<AppState>,
    Path(club_id): Path<i64>,
) -> ApiResult<Json<ClubResponse>> {
    let mut conn = state.db.acquire().await?;
    let club = Club::find_by_id(&mut conn, club_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Club {} not found", club_id)))?;

    Ok(Json(club.into()))
}

/// Update club contact endpoint handler
///
/// `PATCH /v1/clubs/:id/contact`
///
/// Restricted to the club's responsible user. This is the only club field
/// an owner can still change after the club is committed.
pub async fn update_contact(
    State(state): State<AppState>,
    Extension(ActorId(actor_id)): Extension<ActorId>,
    Path(club_id): Path<i64>,
    Json(body): Json<ClubContactUpdate>,
) -> ApiResult<Json<ClubResponse>> {
    body.validate().map_err(CoreError::from_validation)?;

    let mut conn = state.db.acquire().await?;
    let club = Club::find_by_id(&mut conn, club_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Club {} not found", club_id)))?;

    if club.responsible_id != actor_id {
        return Err(ApiError::Forbidden(
            "Only the responsible user may update the club".to_string(),
        ));
    }

    let updated = Club::update_contact(&mut conn, club_id, &body)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Club {} not found", club_id)))?;

    Ok(Json(updated.into()))
}

/// Quota snapshot with per-status breakdown
#[derive(Debug, Serialize)]
pub struct QuotaResponse {
    #[serde(flatten)]
    pub quota: QuotaInfo,

    /// Live licenses already committed (paid/validated)
    pub committed: u32,

    /// Live licenses still awaiting payment
    pub pending: u32,
}

/// Get quota endpoint handler
///
/// `GET /v1/clubs/:id/quota`
///
/// Advisory snapshot; the binding decision happens inside the license
/// creation transaction.
pub async fn get_quota(
    State(state): State<AppState>,
    Path(club_id): Path<i64>,
) -> ApiResult<Json<QuotaResponse>> {
    let mut conn = state.db.acquire().await?;
    let quota = quota::quota_info(&mut conn, club_id).await?;
    let committed = quota::count_with_status(&mut conn, club_id, &LicenseStatus::Committed).await?;
    let pending = quota::count_with_status(&mut conn, club_id, &LicenseStatus::Pending).await?;

    Ok(Json(QuotaResponse {
        quota,
        committed,
        pending,
    }))
}

/// List clubs endpoint handler
///
/// `GET /v1/clubs`
///
/// Back-office listing, newest first.
pub async fn list_clubs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<ClubResponse>>> {
    let mut conn = state.db.acquire().await?;
    let limit = query.limit.clamp(1, 200);
    let offset = query.offset.max(0);
    let clubs = Club::list(&mut conn, limit, offset).await?;

    Ok(Json(clubs.into_iter().map(Into::into).collect()))
}

/// Status transition request body
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Update club status endpoint handler
///
/// `PATCH /v1/clubs/:id/status`
///
/// Back-office transition; accepts only canonical status names.
pub async fn update_status(
    State(state): State<AppState>,
    Path(club_id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> ApiResult<Json<ClubResponse>> {
    let status = ClubStatus::from_str(body.status.trim()).ok_or_else(|| {
        ApiError::BadRequest(format!("Unknown club status: {}", body.status))
    })?;

    let mut conn = state.db.acquire().await?;
    let club = Club::set_status(&mut conn, club_id, status)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Club {} not found", club_id)))?;

    Ok(Json(club.into()))
}

/// Quota adjustment request body
#[derive(Debug, Deserialize)]
pub struct UpdateQuotaRequest {
    pub license_quota: i32,
}

/// Update club quota endpoint handler
///
/// `PATCH /v1/clubs/:id/quota`
///
/// Back-office adjustment of the configured allotment. Lowering the quota
/// below current usage is allowed; existing licenses stay, new admissions
/// overflow to pending.
pub async fn update_quota(
    State(state): State<AppState>,
    Path(club_id): Path<i64>,
    Json(body): Json<UpdateQuotaRequest>,
) -> ApiResult<Json<ClubResponse>> {
    if body.license_quota < 0 {
        return Err(ApiError::BadRequest(
            "license_quota must be zero or greater".to_string(),
        ));
    }

    let mut conn = state.db.acquire().await?;
    let club = Club::set_quota(&mut conn, club_id, body.license_quota)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Club {} not found", club_id)))?;

    Ok(Json(club.into()))
}
