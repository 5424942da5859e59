//! Creation workflow orchestrator
//!
//! Composes the lock coordinator, the event ledger, the quota admission
//! check, and the status machine into the two creation operations:
//!
//! 1. validate input (fail fast, no side effects);
//! 2. derive the idempotency key from operation, owner, and content;
//! 3. under the per-owner advisory lock, in one transaction: consult the
//!    ledger (replay if the key already completed), record the attempt,
//!    take the quota decision (licenses only), insert, mark the attempt
//!    completed;
//! 4. after commit, and only after commit, fire the external side effects:
//!    audit entry, notification, and for overflow the payment-order handoff.
//!
//! Collaborator failures after commit are logged and swallowed. The
//! resource is already durable and must not appear to fail.

use serde_json::json;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use crate::collaborators::{AuditSink, NotificationSink, PaymentProvider};
use crate::error::{CoreError, CoreResult};
use crate::lock::LockCoordinator;
use crate::models::club::{Club, NewClub};
use crate::models::event::{derive_event_key, CreationEvent, EventStatus};
use crate::models::license::{License, NewLicense};
use crate::quota::{self, Admission, QuotaInfo};
use crate::status::LicenseStatus;

/// Operation type recorded in the ledger for club creation
const OP_CLUB_CREATION: &str = "club_creation";

/// Operation type recorded in the ledger for license creation
const OP_LICENSE_CREATION: &str = "license_creation";

/// External side-effect collaborators, injected at construction
#[derive(Clone)]
pub struct Collaborators {
    pub audit: Arc<dyn AuditSink>,
    pub notifications: Arc<dyn NotificationSink>,
    pub payments: Arc<dyn PaymentProvider>,
}

/// Result of a club creation
#[derive(Debug, Clone)]
pub struct ClubCreation {
    /// The created (or replayed) club
    pub club: Club,

    /// True when an identical prior request already created the club
    pub replayed: bool,
}

/// Result of a license creation
#[derive(Debug, Clone)]
pub struct LicenseCreation {
    /// The created (or replayed) license
    pub license: License,

    /// Whether the license was admitted free or routed to payment
    pub admission: Admission,

    /// Quota snapshot taken inside the locked transaction, after the insert
    pub quota: QuotaInfo,

    /// Checkout URL when the overflow branch created a payment order
    pub payment_url: Option<String>,

    /// True when an identical prior request already created the license
    pub replayed: bool,
}

/// Outcome of the locked unit of work
enum Attempt<T> {
    Created(T),
    Replayed(T),
}

/// Creation workflow for clubs and licenses
#[derive(Clone)]
pub struct CreationWorkflow {
    pool: PgPool,
    coordinator: LockCoordinator,
    collaborators: Collaborators,
}

impl CreationWorkflow {
    /// Builds a workflow over the pool with default lock tuning
    pub fn new(pool: PgPool, collaborators: Collaborators) -> Self {
        let coordinator = LockCoordinator::new(pool.clone());
        Self::with_coordinator(pool, coordinator, collaborators)
    }

    /// Builds a workflow with an explicitly tuned coordinator
    pub fn with_coordinator(
        pool: PgPool,
        coordinator: LockCoordinator,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            pool,
            coordinator,
            collaborators,
        }
    }

    /// Creates a club for an owning user
    ///
    /// Idempotent: a second request from the same owner with the same club
    /// name returns the original club with `replayed = true`. An owner who
    /// already manages a *different* club gets [`CoreError::Conflict`].
    ///
    /// # Errors
    ///
    /// - [`CoreError::Validation`] before any lock is taken
    /// - [`CoreError::Conflict`] when the owner already manages a club
    /// - lock/storage errors per [`LockCoordinator::with_lock`]
    pub async fn create_club(&self, owner_id: i64, data: &NewClub) -> CoreResult<ClubCreation> {
        data.validate().map_err(CoreError::from_validation)?;

        let fingerprint = data.name.trim().to_lowercase();
        let event_key = derive_event_key(OP_CLUB_CREATION, owner_id, &fingerprint);
        let lock_key = format!("{OP_CLUB_CREATION}_{owner_id}");
        let payload = json!({
            "owner_id": owner_id,
            "name": data.name,
            "region": data.region,
        });

        let result = self
            .coordinator
            .with_lock(&lock_key, |conn| {
                let event_key = event_key.clone();
                let payload = payload.clone();
                let data = data.clone();
                Box::pin(async move {
                    if let Some(prior_id) = completed_resource(conn, &event_key).await? {
                        let club = Club::find_by_id(conn, prior_id)
                            .await?
                            .ok_or(CoreError::ClubNotFound(prior_id))?;
                        return Ok(Attempt::Replayed(club));
                    }

                    CreationEvent::record(conn, &event_key, OP_CLUB_CREATION, &payload).await?;

                    if Club::find_by_responsible(conn, owner_id).await?.is_some() {
                        return Err(CoreError::Conflict(format!(
                            "user {owner_id} already manages a club"
                        )));
                    }

                    let club = Club::insert(conn, owner_id, &data).await?;
                    CreationEvent::mark_completed(conn, &event_key, club.id).await?;

                    Ok(Attempt::Created(club))
                })
            })
            .await;

        let attempt = match result {
            Ok(attempt) => attempt,
            Err(err) => {
                self.record_failure(&event_key, OP_CLUB_CREATION, &payload, &err)
                    .await;
                return Err(err);
            }
        };

        match attempt {
            Attempt::Replayed(club) => {
                info!(club_id = club.id, owner_id, "club creation replayed");
                Ok(ClubCreation {
                    club,
                    replayed: true,
                })
            }
            Attempt::Created(club) => {
                info!(club_id = club.id, owner_id, "club created");

                self.fire_audit(
                    "club_created",
                    HashMap::from([
                        ("club_id".to_string(), club.id.to_string()),
                        ("owner_id".to_string(), owner_id.to_string()),
                    ]),
                )
                .await;
                self.fire_notification(
                    "club_created",
                    &club.contact_email,
                    HashMap::from([("club_name".to_string(), club.name.clone())]),
                )
                .await;

                Ok(ClubCreation {
                    club,
                    replayed: false,
                })
            }
        }
    }

    /// Creates a license for a club
    ///
    /// Only the club's responsible user may create licenses. The quota
    /// decision is taken inside the locked transaction: with a free slot the
    /// license is admitted as draft; with none it is persisted pending
    /// payment and handed to the payment collaborator, whose checkout URL is
    /// surfaced on the result. Overflow is a successful outcome, not an
    /// error.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Validation`] / [`CoreError::Permission`] /
    ///   [`CoreError::ClubNotFound`] before any lock is taken
    /// - lock/storage errors per [`LockCoordinator::with_lock`]
    pub async fn create_license(
        &self,
        actor_id: i64,
        club_id: i64,
        data: &NewLicense,
    ) -> CoreResult<LicenseCreation> {
        data.validate().map_err(CoreError::from_validation)?;

        let club = {
            let mut conn = self.pool.acquire().await?;
            Club::find_by_id(&mut conn, club_id)
                .await?
                .ok_or(CoreError::ClubNotFound(club_id))?
        };
        if club.responsible_id != actor_id {
            return Err(CoreError::Permission(format!(
                "user {actor_id} is not responsible for club {club_id}"
            )));
        }

        let fingerprint = format!(
            "{}|{}",
            data.holder_name.trim().to_lowercase(),
            data.holder_email.trim().to_lowercase()
        );
        let event_key = derive_event_key(OP_LICENSE_CREATION, club_id, &fingerprint);
        let lock_key = format!("{OP_LICENSE_CREATION}_{club_id}");
        let payload = json!({
            "club_id": club_id,
            "holder_name": data.holder_name,
            "holder_email": data.holder_email,
        });

        let result = self
            .coordinator
            .with_lock(&lock_key, |conn| {
                let event_key = event_key.clone();
                let payload = payload.clone();
                let data = data.clone();
                Box::pin(async move {
                    if let Some(prior_id) = completed_resource(conn, &event_key).await? {
                        let license = License::find_by_id(conn, prior_id)
                            .await?
                            .ok_or(CoreError::LicenseNotFound(prior_id))?;
                        let admission = match license.canonical_status() {
                            LicenseStatus::Pending => Admission::Overflow,
                            _ => Admission::Admitted,
                        };
                        let quota = quota::quota_info(conn, club_id).await?;
                        return Ok(Attempt::Replayed((license, admission, quota)));
                    }

                    CreationEvent::record(conn, &event_key, OP_LICENSE_CREATION, &payload).await?;

                    // The decision and the insert share the transaction, so
                    // two requests can never both take the last free slot.
                    let (admission, _) = quota::admit(conn, club_id).await?;
                    let status = match admission {
                        Admission::Admitted => LicenseStatus::Draft,
                        Admission::Overflow => LicenseStatus::Pending,
                    };

                    let license = License::insert(conn, club_id, &data, &status).await?;
                    CreationEvent::mark_completed(conn, &event_key, license.id).await?;

                    let quota = quota::quota_info(conn, club_id).await?;
                    Ok(Attempt::Created((license, admission, quota)))
                })
            })
            .await;

        let attempt = match result {
            Ok(attempt) => attempt,
            Err(err) => {
                self.record_failure(&event_key, OP_LICENSE_CREATION, &payload, &err)
                    .await;
                return Err(err);
            }
        };

        match attempt {
            Attempt::Replayed((license, admission, quota)) => {
                info!(license_id = license.id, club_id, "license creation replayed");

                let payment_url = match license.payment_order_id {
                    Some(order_id) => self.checkout_url(order_id).await,
                    None => None,
                };

                Ok(LicenseCreation {
                    license,
                    admission,
                    quota,
                    payment_url,
                    replayed: true,
                })
            }
            Attempt::Created((license, admission, quota)) => {
                info!(
                    license_id = license.id,
                    club_id,
                    admission = ?admission,
                    remaining = quota.remaining,
                    "license created"
                );

                self.fire_audit(
                    "license_created",
                    HashMap::from([
                        ("license_id".to_string(), license.id.to_string()),
                        ("club_id".to_string(), club_id.to_string()),
                        (
                            "admission".to_string(),
                            format!("{admission:?}").to_lowercase(),
                        ),
                    ]),
                )
                .await;
                self.fire_notification(
                    "license_created",
                    &club.contact_email,
                    HashMap::from([("holder_name".to_string(), license.holder_name.clone())]),
                )
                .await;

                let mut license = license;
                let mut payment_url = None;
                if admission == Admission::Overflow {
                    (license, payment_url) = self.handoff_to_payment(&club, license).await;
                }

                Ok(LicenseCreation {
                    license,
                    admission,
                    quota,
                    payment_url,
                    replayed: false,
                })
            }
        }
    }

    /// Applies a paid/validated transition to a license
    ///
    /// Entry point for the external payment confirmation or administrative
    /// approval. The raw status spelling is preserved on the row; when it
    /// normalizes to committed, the owner is notified that the license is
    /// now final.
    pub async fn commit_license(&self, license_id: i64, raw_status: &str) -> CoreResult<License> {
        let license = self
            .coordinator
            .transaction(|conn| {
                let raw_status = raw_status.to_string();
                Box::pin(async move {
                    License::set_status(conn, license_id, &raw_status)
                        .await?
                        .ok_or(CoreError::LicenseNotFound(license_id))
                })
            })
            .await?;

        if license.canonical_status() == LicenseStatus::Committed {
            let club = {
                let mut conn = self.pool.acquire().await?;
                Club::find_by_id(&mut conn, license.club_id).await?
            };
            if let Some(club) = club {
                self.fire_notification(
                    "license_committed",
                    &club.contact_email,
                    HashMap::from([("holder_name".to_string(), license.holder_name.clone())]),
                )
                .await;
            }
            self.fire_audit(
                "license_committed",
                HashMap::from([("license_id".to_string(), license.id.to_string())]),
            )
            .await;
        }

        Ok(license)
    }

    /// Quota snapshot for a club, outside any lock (advisory only)
    pub async fn quota_info(&self, club_id: i64) -> CoreResult<QuotaInfo> {
        let mut conn = self.pool.acquire().await?;
        quota::quota_info(&mut conn, club_id).await
    }

    /// Overflow handoff: create the payment order, link it, fetch the URL
    ///
    /// Runs after commit; any failure leaves the license pending payment
    /// with no URL and is only logged.
    async fn handoff_to_payment(
        &self,
        club: &Club,
        license: License,
    ) -> (License, Option<String>) {
        self.fire_notification(
            "quota_overflow",
            &club.contact_email,
            HashMap::from([("holder_name".to_string(), license.holder_name.clone())]),
        )
        .await;

        let order_id = match self
            .collaborators
            .payments
            .create_order(club.responsible_id, &[license.id])
            .await
        {
            Ok(order_id) => order_id,
            Err(err) => {
                warn!(license_id = license.id, error = %err, "payment order creation failed");
                return (license, None);
            }
        };

        let license = match self.link_payment_order(license.id, order_id).await {
            Ok(Some(updated)) => updated,
            Ok(None) | Err(_) => license,
        };

        (license, self.checkout_url(order_id).await)
    }

    async fn link_payment_order(
        &self,
        license_id: i64,
        order_id: i64,
    ) -> CoreResult<Option<License>> {
        let mut conn = self.pool.acquire().await?;
        let updated = License::set_payment_order(&mut conn, license_id, order_id).await?;
        Ok(updated)
    }

    async fn checkout_url(&self, order_id: i64) -> Option<String> {
        match self.collaborators.payments.payment_url(order_id).await {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(order_id, error = %err, "payment URL lookup failed");
                None
            }
        }
    }

    /// Best-effort failure mark in the ledger, outside the rolled-back
    /// transaction
    async fn record_failure(
        &self,
        event_key: &str,
        event_type: &str,
        payload: &serde_json::Value,
        err: &CoreError,
    ) {
        // Lock timeouts never started an attempt.
        if matches!(err, CoreError::LockTimeout { .. }) {
            return;
        }

        if let Err(mark_err) = CreationEvent::mark_failed(
            &self.pool,
            event_key,
            event_type,
            payload,
            &err.to_string(),
        )
        .await
        {
            warn!(event_key, error = %mark_err, "failed to mark creation event failed");
        }
    }

    async fn fire_audit(&self, action: &str, context: HashMap<String, String>) {
        if let Err(err) = self.collaborators.audit.log_event(action, context).await {
            warn!(action, error = %err, "audit sink failed");
        }
    }

    async fn fire_notification(
        &self,
        template: &str,
        recipient: &str,
        data: HashMap<String, String>,
    ) {
        if let Err(err) = self
            .collaborators
            .notifications
            .notify(template, recipient, data)
            .await
        {
            warn!(template, error = %err, "notification sink failed");
        }
    }
}

/// Checks the ledger for a completed attempt under this key
///
/// Returns the prior resource id for a completed attempt. A failed (or
/// crash-orphaned pending) row returns None; the upsert in
/// [`CreationEvent::record`] reclaims it as pending so the current attempt
/// can reuse the key.
async fn completed_resource(
    conn: &mut PgConnection,
    event_key: &str,
) -> CoreResult<Option<i64>> {
    let Some(event) = CreationEvent::find_by_key(conn, event_key).await? else {
        return Ok(None);
    };

    match event.get_status() {
        Some(EventStatus::Completed) => {
            let resource_id = event.resource_id.ok_or_else(|| {
                CoreError::Conflict(format!(
                    "completed creation event '{event_key}' has no resource"
                ))
            })?;
            Ok(Some(resource_id))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_keys_are_per_owner_and_operation() {
        assert_ne!(
            format!("{OP_CLUB_CREATION}_{}", 1),
            format!("{OP_CLUB_CREATION}_{}", 2)
        );
        assert_ne!(
            format!("{OP_CLUB_CREATION}_{}", 1),
            format!("{OP_LICENSE_CREATION}_{}", 1)
        );
    }

    #[test]
    fn test_event_key_ignores_whitespace_and_case_in_name() {
        let a = derive_event_key(OP_CLUB_CREATION, 5, &"  AS Rivière ".trim().to_lowercase());
        let b = derive_event_key(OP_CLUB_CREATION, 5, "as rivière");
        assert_eq!(a, b);
    }

    // Full workflow behavior (idempotent replay, quota branching, post-commit
    // side effects) is exercised against a live database in
    // tests/workflow_tests.rs.
}
