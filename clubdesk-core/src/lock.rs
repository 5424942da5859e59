//! Lock/transaction coordinator
//!
//! Serializes conflicting writes behind a named PostgreSQL advisory lock and
//! runs each unit of work inside a transaction on the same pinned
//! connection. Transient storage conflicts (deadlock, lock-wait timeout,
//! serialization failure) retry the whole acquire → transact → commit cycle
//! with exponential backoff, up to a fixed ceiling; everything else surfaces
//! immediately.
//!
//! The advisory lock is session-scoped: it is explicitly released on every
//! exit path, and if the session dies mid-flight PostgreSQL releases it when
//! the connection closes, so no path can leave the lock held.
//!
//! # Example
//!
//! ```no_run
//! use clubdesk_core::lock::LockCoordinator;
//! use clubdesk_core::error::CoreResult;
//! use sqlx::PgPool;
//!
//! # async fn example(pool: PgPool) -> CoreResult<()> {
//! let coordinator = LockCoordinator::new(pool);
//!
//! let count = coordinator
//!     .with_lock("club_creation_42", |conn| {
//!         Box::pin(async move {
//!             let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM clubs")
//!                 .fetch_one(conn)
//!                 .await?;
//!             Ok(count)
//!         })
//!     })
//!     .await?;
//! # let _ = count;
//! # Ok(())
//! # }
//! ```

use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, PgConnection, PgPool, Postgres};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::{is_retryable_sqlx, CoreError, CoreResult};

/// Unit of work executed inside the coordinator's transaction
///
/// Must be re-runnable: the coordinator re-executes it from scratch on a
/// retryable conflict. All side effects have to stay inside the transaction.
pub type UnitOfWork<'a, T> =
    Box<dyn for<'c> Fn(&'c mut PgConnection) -> BoxFuture<'c, CoreResult<T>> + Send + Sync + 'a>;

/// Coordinator tuning knobs
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// How long to wait for the advisory lock before giving up
    pub acquire_timeout: Duration,

    /// Interval between advisory-lock acquisition probes
    pub poll_interval: Duration,

    /// Retry ceiling for transient conflicts (attempts = 1 + max_retries)
    pub max_retries: u32,

    /// Backoff before retry k is `backoff_base * 2^k`
    pub backoff_base: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            max_retries: 3,
            backoff_base: Duration::from_millis(200),
        }
    }
}

/// Derives the 64-bit advisory lock id for a string key
///
/// First eight bytes of `sha256(key)`, big endian. Collisions between
/// distinct keys are possible in principle but only cost extra
/// serialization, never correctness.
pub fn lock_id(key: &str) -> i64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// Backoff before the given retry (0-based): `base * 2^retry`
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    base * 2u32.saturating_pow(retry)
}

/// Advisory-lock + transaction coordinator
#[derive(Debug, Clone)]
pub struct LockCoordinator {
    pool: PgPool,
    config: LockConfig,
}

impl LockCoordinator {
    /// Creates a coordinator with default tuning
    pub fn new(pool: PgPool) -> Self {
        Self::with_config(pool, LockConfig::default())
    }

    /// Creates a coordinator with explicit tuning
    pub fn with_config(pool: PgPool, config: LockConfig) -> Self {
        Self { pool, config }
    }

    /// Runs a unit of work under the named advisory lock, in a transaction
    ///
    /// For a given key at most one unit of work executes at a time, across
    /// every process sharing the database. The full cycle per attempt:
    ///
    /// 1. pin a connection and acquire the advisory lock (bounded wait);
    /// 2. begin a transaction, execute the unit of work, commit;
    /// 3. release the advisory lock.
    ///
    /// # Errors
    ///
    /// - [`CoreError::LockTimeout`] if the lock cannot be acquired in time
    ///   (never retried);
    /// - [`CoreError::RetryExhausted`] if a transient conflict survives
    ///   every retry;
    /// - the unit of work's own error otherwise, after rollback.
    pub async fn with_lock<T>(
        &self,
        key: &str,
        work: impl for<'c> Fn(&'c mut PgConnection) -> BoxFuture<'c, CoreResult<T>> + Send + Sync,
    ) -> CoreResult<T> {
        let id = lock_id(key);
        let mut retry: u32 = 0;

        loop {
            let mut conn = self.pool.acquire().await?;
            self.acquire_advisory(&mut conn, id, key).await?;

            let result = run_in_transaction(&mut conn, &work).await;

            self.release_advisory(&mut conn, id, key).await;
            drop(conn);

            match result {
                Ok(value) => return Ok(value),
                Err(CoreError::Storage(source)) if is_retryable_sqlx(&source) => {
                    if retry < self.config.max_retries {
                        let delay = backoff_delay(self.config.backoff_base, retry);
                        warn!(
                            key,
                            retry = retry + 1,
                            delay_ms = delay.as_millis() as u64,
                            "transient storage conflict, retrying unit of work"
                        );
                        sleep(delay).await;
                        retry += 1;
                    } else {
                        return Err(CoreError::RetryExhausted {
                            attempts: retry + 1,
                            source,
                        });
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Runs a unit of work in a plain transaction, no advisory lock
    ///
    /// For operations that need atomicity but no cross-request
    /// serialization.
    pub async fn transaction<T>(
        &self,
        work: impl for<'c> Fn(&'c mut PgConnection) -> BoxFuture<'c, CoreResult<T>> + Send + Sync,
    ) -> CoreResult<T> {
        let mut conn = self.pool.acquire().await?;
        run_in_transaction(&mut conn, &work).await
    }

    /// Probes `pg_try_advisory_lock` until it succeeds or the wait budget
    /// runs out
    async fn acquire_advisory(
        &self,
        conn: &mut PoolConnection<Postgres>,
        id: i64,
        key: &str,
    ) -> CoreResult<()> {
        let deadline = Instant::now() + self.config.acquire_timeout;

        loop {
            let (locked,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
                .bind(id)
                .fetch_one(&mut **conn)
                .await?;

            if locked {
                debug!(key, id, "advisory lock acquired");
                return Ok(());
            }

            if Instant::now() + self.config.poll_interval >= deadline {
                return Err(CoreError::LockTimeout {
                    key: key.to_string(),
                    timeout_ms: self.config.acquire_timeout.as_millis() as u64,
                });
            }

            sleep(self.config.poll_interval).await;
        }
    }

    /// Releases the advisory lock, logging rather than propagating failure
    ///
    /// If the session is already broken the release query fails, but the
    /// lock dies with the session when the connection is dropped.
    async fn release_advisory(&self, conn: &mut PoolConnection<Postgres>, id: i64, key: &str) {
        let released: Result<(bool,), sqlx::Error> =
            sqlx::query_as("SELECT pg_advisory_unlock($1)")
                .bind(id)
                .fetch_one(&mut **conn)
                .await;

        match released {
            Ok((true,)) => debug!(key, id, "advisory lock released"),
            Ok((false,)) => warn!(key, id, "advisory lock was not held at release"),
            Err(err) => warn!(key, id, error = %err, "advisory unlock failed, session will release it"),
        }
    }
}

/// Begins a transaction, runs the unit of work, commits on success and rolls
/// back on error
async fn run_in_transaction<T, F>(conn: &mut PoolConnection<Postgres>, work: &F) -> CoreResult<T>
where
    F: for<'c> Fn(&'c mut PgConnection) -> BoxFuture<'c, CoreResult<T>> + Send + Sync,
{
    let mut tx = conn.begin().await?;

    match work(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed after unit-of-work error");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_id_is_deterministic() {
        assert_eq!(lock_id("club_creation_42"), lock_id("club_creation_42"));
    }

    #[test]
    fn test_lock_id_differs_per_key() {
        assert_ne!(lock_id("club_creation_42"), lock_id("club_creation_43"));
        assert_ne!(lock_id("club_creation_42"), lock_id("license_creation_42"));
    }

    #[test]
    fn test_backoff_schedule_doubles() {
        let base = Duration::from_millis(200);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(400));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(800));
    }

    #[test]
    fn test_default_config_matches_contract() {
        let config = LockConfig::default();
        assert_eq!(config.acquire_timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_base, Duration::from_millis(200));
    }

    // Lock release, mutual exclusion, and the retry ceiling need a live
    // database; they are covered in tests/lock_tests.rs.
}
