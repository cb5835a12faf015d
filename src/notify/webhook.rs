//! Webhook notifier — JSON POST to a configured endpoint.

use super::{NotificationRecord, Notifier, NotifyError};
use async_trait::async_trait;
use base64::Engine as _;
use std::time::Duration;

/// Notifier that POSTs the record as JSON; attachments ride along
/// base64-encoded.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, record: &NotificationRecord) -> Result<(), NotifyError> {
        let attachment = record.attachment.as_ref().map(|a| {
            serde_json::json!({
                "filename": a.filename,
                "media_type": a.media_type,
                "data_base64": base64::engine::general_purpose::STANDARD.encode(&a.bytes),
            })
        });
        let payload = serde_json::json!({
            "subject": record.subject,
            "body": record.body,
            "attachment": attachment,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(url = %self.url, "notification delivered");
            return Ok(());
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(NotifyError::Auth(format!("webhook returned {status}")));
        }
        Err(NotifyError::Rejected(format!("webhook returned {status}")))
    }
}
