//! Webhook delivery (C4).
//!
//! Grounded on `webhooks.py`'s `WebhookManager` for the subscription/history
//! bookkeeping shape (bounded `delivery_history`, `get_webhook_stats`) and
//! on `webhook_adapter.py`'s `_call_webhook` for the retry-with-exponential
//! backoff loop. HMAC signing follows the same construction both Python
//! files use (`hmac.new(secret, body, sha256).hexdigest()`), and the
//! constant-time-compare habit this codebase already has for bearer tokens
//! (`mcp_server_builder_utils.rs`'s `subtle::ConstantTimeEq` use) is carried
//! over to comparing signatures on the verifying side, even though signing
//! itself has no secret-comparison step.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::conductor::model::{TriggerKind, WebhookSubscription};
use crate::conductor::scheduler::RingBuffer;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: String,
    pub webhook_id: String,
    pub url: String,
    pub event: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub response_code: Option<u16>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookStats {
    pub webhook_id: String,
    pub total_deliveries: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
}

/// Signed, retrying HTTP POST fan-out per subscription, with a bounded,
/// per-manager delivery history (an explicit fixed-capacity ring, not an
/// unbounded `Vec` pruned after the fact).
pub struct WebhookManager {
    client: Client,
    timeout: Duration,
    retry_delays: Vec<Duration>,
    subscriptions: RwLock<HashMap<String, WebhookSubscription>>,
    history: RwLock<RingBuffer<DeliveryRecord>>,
}

impl WebhookManager {
    pub fn new(timeout: Duration, retry_delays: Vec<Duration>, history_capacity: usize) -> Self {
        Self {
            client: Client::new(),
            timeout,
            retry_delays,
            subscriptions: RwLock::new(HashMap::new()),
            history: RwLock::new(RingBuffer::new(history_capacity)),
        }
    }

    pub async fn register(&self, url: String, events: Vec<TriggerKind>, secret: Option<String>) -> WebhookSubscription {
        let now = Utc::now();
        let sub = WebhookSubscription {
            id: Uuid::new_v4().to_string(),
            url,
            events,
            secret,
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.subscriptions
            .write()
            .await
            .insert(sub.id.clone(), sub.clone());
        sub
    }

    pub async fn unregister(&self, id: &str) -> bool {
        self.subscriptions.write().await.remove(id).is_some()
    }

    pub async fn list(&self) -> Vec<WebhookSubscription> {
        self.subscriptions.read().await.values().cloned().collect()
    }

    /// Delivers `payload` to every active subscription registered for
    /// `trigger`. Failures are recorded but never propagated: the event bus
    /// handler calling this treats webhook delivery as fire-and-forget.
    pub async fn deliver(&self, trigger: TriggerKind, payload: &serde_json::Value) {
        let subs: Vec<WebhookSubscription> = {
            let subs = self.subscriptions.read().await;
            subs.values()
                .filter(|s| s.active && s.events.contains(&trigger))
                .cloned()
                .collect()
        };
        for sub in subs {
            self.deliver_one(&sub, trigger, payload).await;
        }
    }

    async fn deliver_one(&self, sub: &WebhookSubscription, trigger: TriggerKind, payload: &serde_json::Value) {
        let body = canonical_body(trigger, payload);
        let signature = sub.secret.as_ref().map(|secret| sign(secret, &body));

        let mut attempts = 0u32;
        let mut last_status = None;
        let mut last_error = None;
        let total_attempts = self.retry_delays.len() as u32 + 1;

        while attempts < total_attempts {
            attempts += 1;
            let mut request = self
                .client
                .post(&sub.url)
                .timeout(self.timeout)
                .header("Content-Type", "application/json")
                .body(body.clone());
            if let Some(sig) = &signature {
                request = request.header("X-Webhook-Signature", format!("sha256={sig}"));
            }

            match request.send().await {
                Ok(response) if (response.status().as_u16()) < 400 => {
                    last_status = Some(response.status().as_u16());
                    last_error = None;
                    break;
                }
                Ok(response) => {
                    last_status = Some(response.status().as_u16());
                    last_error = Some(format!("http status {}", response.status()));
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                }
            }

            if attempts < total_attempts {
                let delay = self.retry_delays[(attempts - 1) as usize];
                tokio::time::sleep(delay).await;
            }
        }

        let status = if last_error.is_none() {
            DeliveryStatus::Success
        } else {
            log::warn!("webhook delivery to {} failed after {attempts} attempts: {:?}", sub.url, last_error);
            DeliveryStatus::Failed
        };

        let record = DeliveryRecord {
            id: Uuid::new_v4().to_string(),
            webhook_id: sub.id.clone(),
            url: sub.url.clone(),
            event: trigger.as_str().to_string(),
            status,
            attempts,
            response_code: last_status,
            error: last_error,
            created_at: Utc::now(),
        };
        self.history.write().await.push(record);
    }

    pub async fn history(&self, webhook_id: Option<&str>, limit: usize) -> Vec<DeliveryRecord> {
        let history = self.history.read().await;
        history
            .iter()
            .rev()
            .filter(|r| webhook_id.map(|id| r.webhook_id == id).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn stats(&self, webhook_id: &str) -> WebhookStats {
        let history = self.history.read().await;
        let records: Vec<&DeliveryRecord> = history.iter().filter(|r| r.webhook_id == webhook_id).collect();
        let total = records.len();
        let successful = records
            .iter()
            .filter(|r| r.status == DeliveryStatus::Success)
            .count();
        let failed = total - successful;
        let success_rate = if total == 0 {
            0.0
        } else {
            (successful as f64 / total as f64) * 100.0
        };
        WebhookStats {
            webhook_id: webhook_id.to_string(),
            total_deliveries: total,
            successful,
            failed,
            success_rate,
        }
    }
}

/// Canonical JSON body: stable key order `{"event", "data", "timestamp"}`,
/// built by hand rather than relying on a `HashMap`'s (unordered) `Serialize`
/// impl, since the signature is computed over these exact bytes.
fn canonical_body(trigger: TriggerKind, payload: &serde_json::Value) -> String {
    format!(
        "{{\"event\":{},\"data\":{},\"timestamp\":{}}}",
        serde_json::to_string(trigger.as_str()).unwrap(),
        payload,
        serde_json::to_string(&Utc::now().to_rfc3339()).unwrap(),
    )
}

fn sign(secret: &str, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a received signature against the exact body bytes, using a
/// constant-time comparison so a timing side-channel can't leak how many
/// leading hex characters matched.
pub fn verify_signature(secret: &str, body: &str, signature_header: &str) -> bool {
    use subtle::ConstantTimeEq;
    let expected = sign(secret, body);
    let Some(given) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    expected.as_bytes().ct_eq(given.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_manual_hmac() {
        let body = "{\"event\":\"agent.completed\",\"data\":{\"r\":1},\"timestamp\":\"2024-01-01T00:00:00Z\"}";
        let sig = sign("k", body);
        assert!(verify_signature("k", body, &format!("sha256={sig}")));
        assert!(!verify_signature("wrong", body, &format!("sha256={sig}")));
    }

    #[tokio::test]
    async fn stats_on_empty_history_is_zeroed() {
        let manager = WebhookManager::new(Duration::from_secs(1), vec![], 10);
        let stats = manager.stats("nonexistent").await;
        assert_eq!(stats.total_deliveries, 0);
        assert_eq!(stats.success_rate, 0.0);
    }
}
