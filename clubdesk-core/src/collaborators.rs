//! External collaborator interfaces
//!
//! The workflow triggers side effects through these traits *after* its
//! transaction commits: audit logging, notification email, and payment-order
//! creation for quota overflow. Implementations live outside the core (the
//! API crate wires logging ones; tests use the recording mocks). A failing
//! collaborator is logged and never fails the workflow; the resource is
//! already durably committed by the time any of these run.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Collaborator failure, isolated at the workflow boundary
#[derive(Debug, Error)]
#[error("collaborator '{collaborator}' failed: {message}")]
pub struct CollaboratorError {
    /// Which collaborator failed
    pub collaborator: &'static str,

    /// What went wrong
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

/// Fire-and-forget audit trail sink
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records an action with free-form context
    async fn log_event(
        &self,
        action: &str,
        context: HashMap<String, String>,
    ) -> Result<(), CollaboratorError>;
}

/// Outbound notification sink
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sends a templated notification
    async fn notify(
        &self,
        template: &str,
        recipient: &str,
        data: HashMap<String, String>,
    ) -> Result<(), CollaboratorError>;
}

/// Payment-order collaborator for the quota-overflow branch
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a payment order covering the given resources
    async fn create_order(
        &self,
        owner_id: i64,
        resource_ids: &[i64],
    ) -> Result<i64, CollaboratorError>;

    /// Checkout URL for an order, surfaced to the caller
    async fn payment_url(&self, order_id: i64) -> Result<String, CollaboratorError>;
}

/// Recording test doubles
///
/// Each mock appends invocations to a shared vec so tests can assert on the
/// exact side-effect sequence. The payment mock can be flipped into a
/// failing mode to exercise collaborator isolation.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::Mutex;

    /// Audit sink that records every call
    #[derive(Debug, Default)]
    pub struct RecordingAuditSink {
        /// (action, context) per call
        pub events: Mutex<Vec<(String, HashMap<String, String>)>>,
    }

    #[async_trait]
    impl AuditSink for RecordingAuditSink {
        async fn log_event(
            &self,
            action: &str,
            context: HashMap<String, String>,
        ) -> Result<(), CollaboratorError> {
            self.events
                .lock()
                .expect("audit mock lock poisoned")
                .push((action.to_string(), context));
            Ok(())
        }
    }

    /// Notification sink that records every call
    #[derive(Debug, Default)]
    pub struct RecordingNotificationSink {
        /// (template, recipient, data) per call
        pub sent: Mutex<Vec<(String, String, HashMap<String, String>)>>,

        /// When set, every send fails (isolation tests)
        pub fail: AtomicBool,
    }

    #[async_trait]
    impl NotificationSink for RecordingNotificationSink {
        async fn notify(
            &self,
            template: &str,
            recipient: &str,
            data: HashMap<String, String>,
        ) -> Result<(), CollaboratorError> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(CollaboratorError::new("notification", "simulated outage"));
            }
            self.sent
                .lock()
                .expect("notification mock lock poisoned")
                .push((template.to_string(), recipient.to_string(), data));
            Ok(())
        }
    }

    /// Payment provider that hands out sequential order ids
    #[derive(Debug, Default)]
    pub struct RecordingPaymentProvider {
        /// (owner_id, resource_ids) per created order
        pub orders: Mutex<Vec<(i64, Vec<i64>)>>,

        next_order_id: AtomicI64,

        /// When set, order creation fails (isolation tests)
        pub fail: AtomicBool,
    }

    #[async_trait]
    impl PaymentProvider for RecordingPaymentProvider {
        async fn create_order(
            &self,
            owner_id: i64,
            resource_ids: &[i64],
        ) -> Result<i64, CollaboratorError> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(CollaboratorError::new("payment", "simulated outage"));
            }
            self.orders
                .lock()
                .expect("payment mock lock poisoned")
                .push((owner_id, resource_ids.to_vec()));
            Ok(self.next_order_id.fetch_add(1, Ordering::Relaxed) + 1)
        }

        async fn payment_url(&self, order_id: i64) -> Result<String, CollaboratorError> {
            Ok(format!("https://pay.example.org/orders/{order_id}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;

    #[tokio::test]
    async fn test_recording_audit_sink_captures_calls() {
        let sink = RecordingAuditSink::default();
        let mut ctx = HashMap::new();
        ctx.insert("club_id".to_string(), "7".to_string());

        sink.log_event("club_created", ctx).await.unwrap();

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "club_created");
        assert_eq!(events[0].1.get("club_id"), Some(&"7".to_string()));
    }

    #[tokio::test]
    async fn test_payment_provider_sequential_orders() {
        let provider = RecordingPaymentProvider::default();
        let first = provider.create_order(42, &[1]).await.unwrap();
        let second = provider.create_order(42, &[2, 3]).await.unwrap();
        assert_eq!(second, first + 1);

        let url = provider.payment_url(first).await.unwrap();
        assert!(url.ends_with(&format!("/orders/{first}")));
    }

    #[tokio::test]
    async fn test_failing_notification_sink() {
        let sink = RecordingNotificationSink::default();
        sink.fail.store(true, std::sync::atomic::Ordering::Relaxed);

        let err = sink
            .notify("club_created", "a@example.org", HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.collaborator, "notification");
    }
}
