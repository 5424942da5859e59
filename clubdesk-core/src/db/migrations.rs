//! Database migration runner
//!
//! Thin wrapper over sqlx's embedded migrator. Migration files live under
//! `clubdesk-core/migrations/` and are compiled into the binary, so deployed
//! services never depend on the source tree being present.

use sqlx::postgres::PgPool;
use tracing::{info, warn};

/// Summary of applied migrations
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Number of migrations recorded as applied
    pub applied_migrations: usize,

    /// Version of the latest applied migration
    pub latest_version: Option<i64>,
}

/// Runs all pending migrations
///
/// # Errors
///
/// Returns an error if a migration fails; sqlx rolls the failing migration
/// back before surfacing it.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("running database migrations");

    match sqlx::migrate!("./migrations").run(pool).await {
        Ok(()) => {
            info!("database migrations up to date");
            Ok(())
        }
        Err(e) => {
            warn!("migration failed: {}", e);
            Err(e)
        }
    }
}

/// Reports how many migrations have been applied
///
/// # Errors
///
/// Returns an error if the `_sqlx_migrations` bookkeeping table cannot be
/// read (it does not exist until the first `run_migrations` call).
pub async fn get_migration_status(pool: &PgPool) -> Result<MigrationStatus, sqlx::Error> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT version FROM _sqlx_migrations ORDER BY version")
            .fetch_all(pool)
            .await?;

    Ok(MigrationStatus {
        applied_migrations: rows.len(),
        latest_version: rows.last().map(|(v,)| *v),
    })
}
