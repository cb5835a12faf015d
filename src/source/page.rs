//! HTTP text/label source.
//!
//! Plain GET plus a CSS selector — not a browser. Each selector match
//! becomes one item: an ordered line for text mode, a set member for
//! label mode. The selector keeps the provider generic; nothing in here
//! knows any specific site's markup.
//!
//! `scraper`'s types are `!Send`, so all parsing happens in a sync
//! helper that never lives across an await point.

use super::{ObservationError, ObservationSource};
use crate::observation::{LabelSet, Observation, TextLines};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;

/// Whether extracted items form an ordered line list or a label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageShape {
    Lines,
    Labels,
}

/// Text/label source backed by reqwest + scraper.
pub struct PageTextSource {
    url: String,
    selector: String,
    shape: PageShape,
    timeout_ms: u64,
    client: reqwest::Client,
}

impl PageTextSource {
    pub fn new(
        url: impl Into<String>,
        selector: impl Into<String>,
        shape: PageShape,
        timeout_ms: u64,
    ) -> Self {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(ua)
            .build()
            .unwrap_or_default();

        Self {
            url: url.into(),
            selector: selector.into(),
            shape,
            timeout_ms,
            client,
        }
    }

    async fn fetch(&self) -> Result<String, ObservationError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ObservationError::Transport(format!(
                "GET {} returned {status}",
                self.url
            )));
        }

        response.text().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, e: reqwest::Error) -> ObservationError {
        if e.is_timeout() {
            ObservationError::Timeout(self.timeout_ms)
        } else {
            ObservationError::Transport(e.to_string())
        }
    }
}

/// Extract one text item per selector match.
fn extract_items(html: &str, selector: &str) -> Result<Vec<String>, ObservationError> {
    let sel = Selector::parse(selector).map_err(|e| {
        ObservationError::StructureNotFound(format!("invalid selector {selector:?}: {e}"))
    })?;

    let document = Html::parse_document(html);
    let items: Vec<String> = document
        .select(&sel)
        .map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|t| !t.is_empty())
        .collect();

    if items.is_empty() {
        return Err(ObservationError::StructureNotFound(format!(
            "selector {selector:?} matched nothing"
        )));
    }

    Ok(items)
}

#[async_trait]
impl ObservationSource for PageTextSource {
    async fn observe(&self) -> Result<Observation, ObservationError> {
        let html = self.fetch().await?;
        let items = extract_items(&html, &self.selector)?;
        tracing::debug!(count = items.len(), "extracted items");

        Ok(match self.shape {
            PageShape::Lines => Observation::Text(TextLines::new(items)),
            PageShape::Labels => Observation::Labels(LabelSet::new(items)),
        })
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICKET_PAGE: &str = r#"
        <html><body>
            <h1>Tickets</h1>
            <ul>
                <li class="category">Open</li>
                <li class="category">  Relay  </li>
                <li class="category"></li>
            </ul>
        </body></html>
    "#;

    #[test]
    fn test_extract_items_normalizes_whitespace() {
        let items = extract_items(TICKET_PAGE, "li.category").unwrap();
        assert_eq!(items, vec!["Open".to_string(), "Relay".to_string()]);
    }

    #[test]
    fn test_empty_match_is_structure_not_found() {
        let err = extract_items(TICKET_PAGE, "li.missing").unwrap_err();
        assert!(matches!(err, ObservationError::StructureNotFound(_)));
    }

    #[test]
    fn test_invalid_selector_is_structure_not_found() {
        let err = extract_items(TICKET_PAGE, ":::").unwrap_err();
        assert!(matches!(err, ObservationError::StructureNotFound(_)));
    }

    #[test]
    fn test_nested_elements_flatten_to_one_item() {
        let html = "<div class='row'><span>Open</span> <span>Relay</span></div>";
        let items = extract_items(html, "div.row").unwrap();
        assert_eq!(items, vec!["Open Relay".to_string()]);
    }
}
