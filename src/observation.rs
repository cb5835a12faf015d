//! Observation model — the sampled state of a watched page.
//!
//! Exactly one variant is active per deployment: a rendered frame, the
//! page's visible text lines, or an unordered label set. The detector is
//! polymorphic over the variant, but both sides of a comparison must
//! share it.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Cursor;
use thiserror::Error;

/// Which payload shape an observation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    Render,
    Text,
    Labels,
}

impl std::fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObservationKind::Render => write!(f, "render"),
            ObservationKind::Text => write!(f, "text"),
            ObservationKind::Labels => write!(f, "labels"),
        }
    }
}

/// The sampled state of the watched page at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Rendered frame (RGBA pixel grid).
    Render(RenderFrame),
    /// Ordered, normalized text lines.
    Text(TextLines),
    /// Unordered, normalized label set.
    Labels(LabelSet),
}

/// A rendered page frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    pub image: RgbaImage,
}

impl RenderFrame {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Ordered text lines; each line trimmed, empty lines dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLines {
    lines: Vec<String>,
}

impl TextLines {
    /// Normalize raw lines: trim each, drop the empties.
    pub fn new<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines = raw
            .into_iter()
            .map(|l| l.as_ref().trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Unordered label set; case/whitespace-normalized, deduplicated.
///
/// Labels are compared on a case-folded key so that a pure case variant
/// of a known label is not a new label. The first-seen spelling is kept
/// for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    /// Case-folded key → display spelling.
    labels: BTreeMap<String, String>,
}

impl LabelSet {
    /// Normalize raw labels: trim, collapse inner whitespace, dedupe on
    /// the case-folded form.
    pub fn new<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut labels = BTreeMap::new();
        for label in raw {
            let display = label
                .as_ref()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if display.is_empty() {
                continue;
            }
            labels.entry(display.to_lowercase()).or_insert(display);
        }
        Self { labels }
    }

    /// Display spellings, ordered by folded key.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains_key(&label.to_lowercase())
    }

    /// Display spellings of labels present here but absent from `other`,
    /// compared case-insensitively.
    pub fn difference(&self, other: &LabelSet) -> Vec<String> {
        self.labels
            .iter()
            .filter(|(key, _)| !other.labels.contains_key(*key))
            .map(|(_, display)| display.clone())
            .collect()
    }
}

/// Payload (de)serialization failure.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("image payload could not be coded: {0}")]
    Image(#[from] image::ImageError),
    #[error("text payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl Observation {
    pub fn kind(&self) -> ObservationKind {
        match self {
            Observation::Render(_) => ObservationKind::Render,
            Observation::Text(_) => ObservationKind::Text,
            Observation::Labels(_) => ObservationKind::Labels,
        }
    }

    /// Serialize the payload for the baseline store.
    ///
    /// Text and labels become a UTF-8 newline-joined list; a render frame
    /// becomes a PNG blob.
    pub fn to_payload(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Observation::Render(frame) => {
                let mut buf = Vec::new();
                frame
                    .image
                    .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
                Ok(buf)
            }
            Observation::Text(text) => Ok(text.lines.join("\n").into_bytes()),
            Observation::Labels(set) => {
                Ok(set.iter().collect::<Vec<_>>().join("\n").into_bytes())
            }
        }
    }

    /// Deserialize a payload written by [`Observation::to_payload`].
    pub fn from_payload(kind: ObservationKind, bytes: &[u8]) -> Result<Self, CodecError> {
        match kind {
            ObservationKind::Render => {
                let image = image::load_from_memory(bytes)?.to_rgba8();
                Ok(Observation::Render(RenderFrame::new(image)))
            }
            ObservationKind::Text => {
                let text = String::from_utf8(bytes.to_vec())?;
                Ok(Observation::Text(TextLines::new(text.lines())))
            }
            ObservationKind::Labels => {
                let text = String::from_utf8(bytes.to_vec())?;
                Ok(Observation::Labels(LabelSet::new(text.lines())))
            }
        }
    }

    /// One-line human description, for logs and the `show` command.
    pub fn summary(&self) -> String {
        match self {
            Observation::Render(f) => format!("{}x{} frame", f.width(), f.height()),
            Observation::Text(t) => format!("{} lines", t.lines.len()),
            Observation::Labels(s) => format!("{} labels", s.len()),
        }
    }
}
