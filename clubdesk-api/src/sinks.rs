/// Collaborator implementations wired by the API server
///
/// The core workflow talks to audit, notification, and payment collaborators
/// through traits. This module provides the production implementations:
/// structured-log sinks for audit and notifications, and an HTTP client for
/// the payment order service.
///
/// All of these run after the creating transaction has committed; their
/// failures are logged by the workflow and never surfaced to the client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use clubdesk_core::collaborators::{
    AuditSink, CollaboratorError, NotificationSink, PaymentProvider,
};

use crate::config::PaymentConfig;

/// Audit sink that emits structured log records
///
/// Audit consumers tail the log stream filtered on `target = "audit"`.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log_event(
        &self,
        action: &str,
        context: HashMap<String, String>,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(target: "audit", action, context = ?context, "audit event");
        Ok(())
    }
}

/// Notification sink that emits structured log records
///
/// Stands in for the mail pipeline; the template name and recipient are
/// enough for delivery to be replayed from the log.
#[derive(Debug, Default)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(
        &self,
        template: &str,
        recipient: &str,
        data: HashMap<String, String>,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(
            target: "notifications",
            template,
            recipient,
            data = ?data,
            "notification queued"
        );
        Ok(())
    }
}

/// HTTP client for the payment order service
pub struct HttpPaymentProvider {
    client: reqwest::Client,
    base_url: String,
}

/// Response body of `POST {base_url}/orders`
#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    order_id: i64,
}

/// Response body of `GET {base_url}/orders/{id}`
#[derive(Debug, Deserialize)]
struct OrderResponse {
    checkout_url: String,
}

impl HttpPaymentProvider {
    /// Builds the provider from payment configuration
    pub fn new(config: &PaymentConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn create_order(
        &self,
        owner_id: i64,
        resource_ids: &[i64],
    ) -> Result<i64, CollaboratorError> {
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .json(&json!({
                "owner_id": owner_id,
                "license_ids": resource_ids,
            }))
            .send()
            .await
            .map_err(|err| CollaboratorError::new("payment", err.to_string()))?
            .error_for_status()
            .map_err(|err| CollaboratorError::new("payment", err.to_string()))?;

        let body: CreateOrderResponse = response
            .json()
            .await
            .map_err(|err| CollaboratorError::new("payment", err.to_string()))?;

        Ok(body.order_id)
    }

    async fn payment_url(&self, order_id: i64) -> Result<String, CollaboratorError> {
        let response = self
            .client
            .get(format!("{}/orders/{}", self.base_url, order_id))
            .send()
            .await
            .map_err(|err| CollaboratorError::new("payment", err.to_string()))?
            .error_for_status()
            .map_err(|err| CollaboratorError::new("payment", err.to_string()))?;

        let body: OrderResponse = response
            .json()
            .await
            .map_err(|err| CollaboratorError::new("payment", err.to_string()))?;

        Ok(body.checkout_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sinks_never_fail() {
        let audit = TracingAuditSink;
        audit
            .log_event("club_created", HashMap::new())
            .await
            .unwrap();

        let notifications = TracingNotificationSink;
        notifications
            .notify("club_created", "contact@example.org", HashMap::new())
            .await
            .unwrap();
    }

    #[test]
    fn test_payment_provider_strips_trailing_slash() {
        let provider = HttpPaymentProvider::new(&PaymentConfig {
            base_url: "https://pay.example.org/".to_string(),
            timeout_seconds: 5,
        })
        .unwrap();

        assert_eq!(provider.base_url, "https://pay.example.org");
    }
}
