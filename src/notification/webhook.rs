use anyhow::Result;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{info, warn};

use super::{labels, NotificationDispatcher};
use crate::models::notification::{Notice, NotificationKind, Priority};

// ── Webhook Event ─────────────────────────────────────────────

/// Payload POSTed to every configured endpoint for one notice.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    /// e.g. "approval_requested", "document_rejected".
    pub event_type: String,
    /// ISO-8601.
    pub timestamp: String,
    pub recipient_id: String,
    pub priority: Priority,
    /// Human-readable headline, e.g. "Urgent: Approval requested".
    pub headline: String,
    pub document: serde_json::Value,
}

impl WebhookEvent {
    pub fn from_notice(notice: &Notice) -> Self {
        let headline = match notice.priority {
            Priority::High => format!(
                "{}: {}",
                labels::priority_label(notice.priority),
                labels::kind_label(notice.kind)
            ),
            Priority::Normal => labels::kind_label(notice.kind).to_string(),
        };
        Self {
            event_type: event_type(notice.kind).to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            recipient_id: notice.user_id.to_string(),
            priority: notice.priority,
            headline,
            document: serde_json::to_value(&notice.document).unwrap_or_default(),
        }
    }
}

fn event_type(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::ApprovalRequested => "approval_requested",
        NotificationKind::DocumentApproved => "document_approved",
        NotificationKind::DocumentRejected => "document_rejected",
        NotificationKind::DocumentWithdrawn => "document_withdrawn",
    }
}

// ── HMAC Signing ─────────────────────────────────────────────

/// HMAC-SHA256 of `payload` as "sha256=<hex>".
fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid webhook secret: {}", e))?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

// ── Dispatcher ───────────────────────────────────────────────

/// Posts notices to one or more URLs, optionally signed with
/// `x-docflow-signature`. One attempt per URL per call; the
/// [`Notifier`](super::Notifier) owns retry and timeout.
#[derive(Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    urls: Vec<String>,
    secret: Option<String>,
}

impl WebhookDispatcher {
    pub fn new(urls: Vec<String>, secret: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Docflow-Webhook/1.0")
            .build()?;
        Ok(Self {
            client,
            urls,
            secret,
        })
    }

    async fn post(&self, url: &str, event: &WebhookEvent, payload: &[u8]) -> Result<()> {
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let mut req = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .header("x-docflow-delivery-id", &delivery_id)
            .header("x-docflow-event", &event.event_type);

        if let Some(secret) = self.secret.as_deref() {
            req = req.header("x-docflow-signature", hmac_sha256_hex(secret, payload)?);
        }

        let resp = req.body(payload.to_vec()).send().await?;
        let status = resp.status();
        if status.is_success() {
            info!(
                url,
                event_type = %event.event_type,
                delivery_id = %delivery_id,
                status = %status,
                "webhook delivered"
            );
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        warn!(
            url,
            event_type = %event.event_type,
            delivery_id = %delivery_id,
            status = %status,
            body = %body,
            "webhook delivery failed (non-2xx)"
        );
        Err(anyhow::anyhow!("webhook {} returned {}", url, status))
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    /// Every URL is tried; the call fails if any of them failed so the
    /// notifier retries.
    async fn notify(&self, notice: &Notice) -> Result<()> {
        let event = WebhookEvent::from_notice(notice);
        let payload = serde_json::to_vec(&event)
            .map_err(|e| anyhow::anyhow!("webhook serialize error: {}", e))?;

        let mut failed = Vec::new();
        for url in &self.urls {
            if let Err(e) = self.post(url, &event, &payload).await {
                failed.push(format!("{}: {}", url, e));
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("{}", failed.join("; ")))
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

// ── Tests ─────────────────────────────────────────────────────
