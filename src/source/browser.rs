//! Headless-Chromium render source.
//!
//! Launches a short-lived headless browser, navigates to the target at a
//! fixed viewport, and yields the screenshot as a render observation.
//! One launch per observe call; a cycle runs exactly once per process.

use super::{ObservationError, ObservationSource};
use crate::observation::{Observation, RenderFrame};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. PAGEWATCH_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("PAGEWATCH_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.pagewatch/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = vec![
            home.join(".pagewatch/chromium/chrome-linux64/chrome"),
            home.join(".pagewatch/chromium/chrome"),
        ];
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    if let Ok(path) = which::which("google-chrome") {
        return Some(path);
    }
    if let Ok(path) = which::which("chromium") {
        return Some(path);
    }
    if let Ok(path) = which::which("chromium-browser") {
        return Some(path);
    }

    None
}

/// Render source backed by headless Chromium.
pub struct ChromiumSource {
    url: String,
    width: u32,
    height: u32,
    timeout_ms: u64,
}

impl ChromiumSource {
    pub fn new(url: impl Into<String>, width: u32, height: u32, timeout_ms: u64) -> Self {
        Self {
            url: url.into(),
            width,
            height,
            timeout_ms,
        }
    }

    async fn capture(&self) -> Result<RenderFrame, ObservationError> {
        let chrome_path = find_chromium().ok_or_else(|| {
            ObservationError::Transport(
                "Chromium not found; set PAGEWATCH_CHROMIUM_PATH or install chromium".to_string(),
            )
        })?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(self.width, self.height)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .build()
            .map_err(|e| ObservationError::Transport(format!("browser config: {e}")))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ObservationError::Transport(format!("failed to launch Chromium: {e}")))?;

        // Drain CDP events for the life of the browser.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let result = self.capture_page(&browser).await;

        let _ = browser.close().await;
        handler_task.abort();

        result
    }

    async fn capture_page(&self, browser: &Browser) -> Result<RenderFrame, ObservationError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ObservationError::Transport(format!("failed to create page: {e}")))?;

        let timeout = Duration::from_millis(self.timeout_ms);
        match tokio::time::timeout(timeout, page.goto(self.url.as_str())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(ObservationError::Transport(format!(
                    "navigation failed: {e}"
                )))
            }
            Err(_) => return Err(ObservationError::Timeout(self.timeout_ms)),
        }
        let _ = page.wait_for_navigation().await;

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let png = tokio::time::timeout(timeout, page.screenshot(params))
            .await
            .map_err(|_| ObservationError::Timeout(self.timeout_ms))?
            .map_err(|e| ObservationError::Transport(format!("screenshot failed: {e}")))?;

        let image = image::load_from_memory(&png)
            .map_err(|e| ObservationError::StructureNotFound(format!("bad screenshot: {e}")))?
            .to_rgba8();

        Ok(RenderFrame::new(image))
    }
}

#[async_trait]
impl ObservationSource for ChromiumSource {
    async fn observe(&self) -> Result<Observation, ObservationError> {
        let frame = self.capture().await?;
        tracing::debug!(
            width = frame.width(),
            height = frame.height(),
            "captured render frame"
        );
        Ok(Observation::Render(frame))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
