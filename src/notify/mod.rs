//! Notification collaborator client
//!
//! Out-of-band delivery (validation codes, fee notices) is owned by an
//! external notification service. This module is a thin HTTP client for it;
//! when no service URL is configured, deliveries degrade to log lines.
//! Delivery failures are logged and never fail the calling operation.

use serde_json::json;

use crate::codes::ValidationCode;
use crate::fees::Fee;

/// Client for the external notification service
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl Notifier {
    pub fn new(url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// Hand a freshly issued validation code to the delivery channel.
    pub async fn deliver_code(&self, code: &ValidationCode) {
        let payload = json!({
            "kind": "validation_code",
            "code": code.code,
            "delivery_method": code.delivery_method,
            "transfer_id": code.transfer_id,
            "loan_id": code.loan_id,
            "expires_at": code.expires_at,
        });

        self.send(payload, "validation code").await;
    }

    /// Notify the user that a fee has been assessed against them.
    pub async fn fee_assessed(&self, fee: &Fee) {
        let payload = json!({
            "kind": "fee_assessed",
            "fee_id": fee.id,
            "user_id": fee.user_id,
            "fee_type": fee.fee_type,
            "amount": fee.amount,
            "reason": fee.reason,
        });

        self.send(payload, "fee notice").await;
    }

    async fn send(&self, payload: serde_json::Value, what: &str) {
        match &self.url {
            Some(url) => {
                match self.client.post(url).json(&payload).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        tracing::debug!(kind = %what, "Notification dispatched");
                    }
                    Ok(resp) => {
                        tracing::warn!(
                            kind = %what,
                            status = %resp.status(),
                            "Notification service rejected payload"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(kind = %what, error = %e, "Notification delivery failed");
                    }
                }
            }
            None => {
                tracing::info!(kind = %what, payload = %payload, "NOTIFY_URL not set, logging notification");
            }
        }
    }
}
