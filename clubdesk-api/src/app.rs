/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use clubdesk_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config)?;
/// let app = clubdesk_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::config::Config;
use crate::error::ApiError;
use crate::sinks::{HttpPaymentProvider, TracingAuditSink, TracingNotificationSink};
use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, patch, post},
    Router,
};
use clubdesk_core::workflow::{Collaborators, CreationWorkflow};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Creation workflow over the pool
    pub workflow: CreationWorkflow,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state with production collaborators
    pub fn new(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let collaborators = Collaborators {
            audit: Arc::new(TracingAuditSink),
            notifications: Arc::new(TracingNotificationSink),
            payments: Arc::new(HttpPaymentProvider::new(&config.payment)?),
        };

        Ok(Self {
            workflow: CreationWorkflow::new(db.clone(), collaborators),
            db,
            config: Arc::new(config),
        })
    }

    /// Creates application state with explicit collaborators (tests)
    pub fn with_collaborators(db: PgPool, config: Config, collaborators: Collaborators) -> Self {
        Self {
            workflow: CreationWorkflow::new(db.clone(), collaborators),
            db,
            config: Arc::new(config),
        }
    }
}

/// Identity of the acting user, injected into request extensions
///
/// The upstream gateway authenticates the session and forwards the user id
/// in the `X-User-Id` header; this service trusts that header.
#[derive(Debug, Clone, Copy)]
pub struct ActorId(pub i64);

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// The router is organized as follows:
/// ```text
/// /
/// ├── /health                       # Health check (public)
/// └── /v1/                          # API v1 (identified requests)
///     ├── /clubs/
///     │   ├── POST   /              # Create club (idempotent)
///     │   ├── GET    /              # List clubs (back office)
///     │   ├── GET    /:id           # Fetch club
///     │   ├── PATCH  /:id/contact   # Update contact (responsible only)
///     │   ├── PATCH  /:id/status    # Status transition (back office)
///     │   ├── GET    /:id/quota     # Quota snapshot
///     │   ├── PATCH  /:id/quota     # Adjust allotment (back office)
///     │   ├── POST   /:id/licenses  # Create license (idempotent)
///     │   └── GET    /:id/licenses  # List licenses (responsible only)
///     └── /licenses/
///         ├── GET    /:id           # Fetch license
///         ├── PATCH  /:id           # Owner edit (editable statuses only)
///         ├── POST   /:id/commit    # Payment/validation callback
///         └── DELETE /:id           # Soft delete
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Identity (per /v1, from the gateway-forwarded header)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public, no identity)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let club_routes = Router::new()
        .route(
            "/",
            post(routes::clubs::create_club).get(routes::clubs::list_clubs),
        )
        .route("/:id", get(routes::clubs::get_club))
        .route("/:id/contact", patch(routes::clubs::update_contact))
        .route("/:id/status", patch(routes::clubs::update_status))
        .route(
            "/:id/quota",
            get(routes::clubs::get_quota).patch(routes::clubs::update_quota),
        )
        .route("/:id/licenses", post(routes::licenses::create_license))
        .route("/:id/licenses", get(routes::licenses::list_licenses));

    let license_routes = Router::new()
        .route(
            "/:id",
            get(routes::licenses::get_license)
                .patch(routes::licenses::update_license)
                .delete(routes::licenses::delete_license),
        )
        .route("/:id/commit", post(routes::licenses::commit_license));

    let v1_routes = Router::new()
        .nest("/clubs", club_routes)
        .nest("/licenses", license_routes)
        .layer(axum::middleware::from_fn(identity_layer));

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.contains(&"*".to_string()) {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        // Production mode: configure allowed origins
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

/// Identity middleware layer
///
/// Parses the gateway-forwarded `X-User-Id` header and injects [`ActorId`]
/// into request extensions.
async fn identity_layer(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let user_id = req
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing X-User-Id header".to_string()))?;

    let user_id: i64 = user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid X-User-Id header".to_string()))?;

    req.extensions_mut().insert(ActorId(user_id));

    Ok(next.run(req).await)
}
