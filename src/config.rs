//! Watch configuration.
//!
//! One JSON file per watched target. Every field except `url` has a
//! default, so a minimal config is `{"url": "https://…"}`.

use crate::detect::{DetectOptions, DEFAULT_PIXEL_THRESHOLD};
use crate::reconcile::CycleSettings;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which observation variant this deployment samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// Screenshot the page and diff pixels.
    Render,
    /// Extract ordered text lines and diff by membership.
    Text,
    /// Extract a label set and diff by set difference.
    Labels,
}

/// What to do when notification delivery fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyFailurePolicy {
    /// Keep the baseline so the change is re-detected and re-notified
    /// next cycle (at-least-once delivery). The default.
    Abort,
    /// Advance the baseline anyway (at-most-once delivery).
    Advance,
}

/// Configuration for one watched target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Page to watch.
    pub url: String,
    pub mode: WatchMode,
    /// CSS selector for text/labels modes; each match is one item.
    pub selector: String,
    /// Viewport for render mode.
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Per-capability timeout.
    pub timeout_ms: u64,
    /// Per-channel pixel threshold for render mode.
    pub threshold: u8,
    /// Also carry removed lines/labels in change deltas.
    pub report_removed: bool,
    pub on_notify_failure: NotifyFailurePolicy,
    /// Baseline store root; defaults to `~/.pagewatch`.
    pub state_dir: Option<PathBuf>,
    /// Baseline key; defaults to the URL host.
    pub key: Option<String>,
    /// Webhook endpoint; when absent, notifications go to the log.
    pub webhook_url: Option<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            mode: WatchMode::Render,
            selector: "body".to_string(),
            viewport_width: 1280,
            viewport_height: 1024,
            timeout_ms: 30_000,
            threshold: DEFAULT_PIXEL_THRESHOLD,
            report_removed: false,
            on_notify_failure: NotifyFailurePolicy::Abort,
            state_dir: None,
            key: None,
            webhook_url: None,
        }
    }
}

impl WatchConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: WatchConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            bail!("config is missing \"url\"");
        }
        url::Url::parse(&self.url).with_context(|| format!("invalid url {:?}", self.url))?;
        if self.selector.trim().is_empty() {
            bail!("config has an empty \"selector\"");
        }
        Ok(())
    }

    /// The baseline key: explicit `key`, or the URL host.
    pub fn baseline_key(&self) -> Result<String> {
        if let Some(key) = &self.key {
            return Ok(key.clone());
        }
        let parsed = url::Url::parse(&self.url)?;
        match parsed.host_str() {
            Some(host) => Ok(host.to_string()),
            None => bail!("url {:?} has no host; set an explicit \"key\"", self.url),
        }
    }

    /// The baseline store root: explicit `state_dir`, or `~/.pagewatch`.
    pub fn resolved_state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pagewatch")
    }

    pub fn detect_options(&self) -> DetectOptions {
        DetectOptions {
            threshold: self.threshold,
            report_removed: self.report_removed,
        }
    }

    pub fn cycle_settings(&self) -> Result<CycleSettings> {
        Ok(CycleSettings {
            key: self.baseline_key()?,
            detect: self.detect_options(),
            on_notify_failure: self.on_notify_failure,
        })
    }
}
