//! Outbound notifications.
//!
//! The engine hands notices to [`Notifier::dispatch`] only after the
//! workflow commit succeeded. Delivery runs on its own task with a per-call
//! timeout and retries; a failure is logged and never reaches the caller of
//! the workflow operation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::AppError;
use crate::models::notification::Notice;

pub mod labels;
pub mod webhook;

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one notice. A single attempt; retry is the caller's job.
    async fn notify(&self, notice: &Notice) -> anyhow::Result<()>;

    fn name(&self) -> &'static str;
}

/// Writes notices to the log only. Used when no delivery target is configured.
#[derive(Debug, Default, Clone)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn notify(&self, notice: &Notice) -> anyhow::Result<()> {
        info!(
            user_id = %notice.user_id,
            document_id = %notice.document.id,
            kind = labels::kind_label(notice.kind),
            priority = labels::priority_label(notice.priority),
            "notification"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_attempts: 4,
            base_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    dispatcher: Arc<dyn NotificationDispatcher>,
    policy: DeliveryPolicy,
}

impl Notifier {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>, policy: DeliveryPolicy) -> Self {
        Self { dispatcher, policy }
    }

    /// Fire-and-forget delivery of `notices` on a background task.
    ///
    /// Each notice is delivered independently; one failing does not hold up
    /// the rest. The handle is returned for callers (tests, shutdown) that
    /// want to wait.
    pub fn dispatch(&self, notices: Vec<Notice>) -> Option<JoinHandle<()>> {
        if notices.is_empty() {
            return None;
        }
        let notifier = self.clone();
        Some(tokio::spawn(async move {
            for notice in &notices {
                if let Err(e) = notifier.deliver(notice).await {
                    error!(
                        user_id = %notice.user_id,
                        document_id = %notice.document.id,
                        kind = ?notice.kind,
                        error = %e,
                        "notification dropped after retries"
                    );
                }
            }
        }))
    }

    /// Deliver one notice with timeout and exponential back-off.
    pub async fn deliver(&self, notice: &Notice) -> Result<(), AppError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.policy.timeout, self.dispatcher.notify(notice)).await {
                Ok(Ok(())) => {
                    debug!(
                        dispatcher = self.dispatcher.name(),
                        user_id = %notice.user_id,
                        attempt,
                        "notification delivered"
                    );
                    return Ok(());
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    warn!(
                        dispatcher = self.dispatcher.name(),
                        attempt,
                        error = %e,
                        "notification attempt failed"
                    );
                }
                Err(_) => {
                    last_error = format!("timed out after {:?}", self.policy.timeout);
                    warn!(
                        dispatcher = self.dispatcher.name(),
                        attempt,
                        timeout_ms = self.policy.timeout.as_millis() as u64,
                        "notification attempt timed out"
                    );
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        Err(AppError::CollaboratorUnavailable(format!(
            "{} dispatcher: {}",
            self.dispatcher.name(),
            last_error
        )))
    }

    /// base * 2^(attempt-1), plus up to 20% jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.policy.base_backoff.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << (attempt - 1).min(16));
        let jitter = if exp > 0 {
            rand::thread_rng().gen_range(0..=exp / 5)
        } else {
            0
        };
        Duration::from_millis(exp + jitter)
    }
}
