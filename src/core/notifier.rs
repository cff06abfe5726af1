// src/core/notifier.rs

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::models::Escalation;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("escalation request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("moderation endpoint returned HTTP {0}")]
    Status(u16),
}

/// One-way hand-off of unsafe findings to human moderators.
#[async_trait]
pub trait ModerationNotifier: Send + Sync {
    async fn notify(&self, escalation: &Escalation) -> Result<(), NotifyError>;
}

/// POSTs escalations as JSON to a moderation webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("LinkSentry/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(NotifyError::Client)?;
        Ok(Self { http, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl ModerationNotifier for WebhookNotifier {
    async fn notify(&self, escalation: &Escalation) -> Result<(), NotifyError> {
        let response = self.http.post(&self.endpoint).json(escalation).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Moderation webhook rejected the escalation.");
            return Err(NotifyError::Status(status.as_u16()));
        }
        info!(
            scan_id = %escalation.details.scan_id,
            unsafe_urls = escalation.details.unsafe_urls.len(),
            "Escalation delivered to moderation."
        );
        Ok(())
    }
}

/// Used when no moderation endpoint is configured: the escalation only
/// reaches the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl ModerationNotifier for LogNotifier {
    async fn notify(&self, escalation: &Escalation) -> Result<(), NotifyError> {
        warn!(
            scan_id = %escalation.details.scan_id,
            target_table = %escalation.target_table,
            target_id = %escalation.target_id,
            unsafe_urls = ?escalation.details.unsafe_urls,
            reason = %escalation.reason,
            "Unsafe content needs moderation (no webhook configured)."
        );
        Ok(())
    }
}
