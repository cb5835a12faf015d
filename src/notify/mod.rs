//! Notifiers — deliver a human-readable summary of a change.
//!
//! A notification record is ephemeral: built from a [`ChangeResult`],
//! handed to the notifier, and dropped when the cycle ends. It is never
//! persisted.

pub mod webhook;

use crate::detect::{ChangeResult, Delta};
use async_trait::async_trait;
use thiserror::Error;

/// How many added/removed items a notification body lists before
/// truncating.
const MAX_LISTED_ITEMS: usize = 20;

/// One outbound notification.
#[derive(Debug, Clone)]
pub struct NotificationRecord {
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

/// Binary artifact riding along with a notification.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Notification delivery failure.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier rejected credentials: {0}")]
    Auth(String),
    #[error("notifier transport failure: {0}")]
    Transport(String),
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// A channel that can deliver notification records.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, record: &NotificationRecord) -> Result<(), NotifyError>;
}

/// Build the notification for a detected change.
pub fn build_notification(target: &str, result: &ChangeResult) -> NotificationRecord {
    let subject = format!("Change detected: {target}");

    let mut body = format!("{target} changed: {}.\n", result.summary());
    match &result.delta {
        Delta::Text(d) | Delta::Labels(d) => {
            if !d.added.is_empty() {
                body.push_str("\nNew:\n");
                push_items(&mut body, &d.added);
            }
            if !d.removed.is_empty() {
                body.push_str("\nGone:\n");
                push_items(&mut body, &d.removed);
            }
        }
        Delta::Render(_) | Delta::None => {}
    }

    let attachment = result.artifact.as_ref().map(|png| Attachment {
        filename: "diff.png".to_string(),
        media_type: "image/png".to_string(),
        bytes: png.clone(),
    });

    NotificationRecord {
        subject,
        body,
        attachment,
    }
}

fn push_items(body: &mut String, items: &[String]) {
    for item in items.iter().take(MAX_LISTED_ITEMS) {
        body.push_str("  - ");
        body.push_str(item);
        body.push('\n');
    }
    if items.len() > MAX_LISTED_ITEMS {
        body.push_str(&format!("  … and {} more\n", items.len() - MAX_LISTED_ITEMS));
    }
}

/// Notifier that only logs, for dry runs and deployments without a
/// delivery channel configured.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, record: &NotificationRecord) -> Result<(), NotifyError> {
        tracing::info!(subject = %record.subject, "notification:\n{}", record.body);
        Ok(())
    }
}
