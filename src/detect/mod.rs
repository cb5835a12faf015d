//! Change detector — pure comparison of a fresh observation against the
//! stored baseline.
//!
//! `detect` is deterministic: for fixed inputs and options it always
//! produces the same [`ChangeResult`]. It performs no I/O and never
//! consults the clock; everything effectful lives in the reconciler.

pub mod labels;
pub mod render;
pub mod text;

use crate::observation::{Observation, ObservationKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default per-channel intensity threshold for pixel diffs.
///
/// Suppresses anti-aliasing and JPEG re-encode noise; a channel delta
/// below this never counts as a change.
pub const DEFAULT_PIXEL_THRESHOLD: u8 = 30;

/// Tuning knobs for a comparison.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DetectOptions {
    /// Per-channel pixel threshold (render observations only).
    pub threshold: u8,
    /// Also report removed lines/labels in the delta. Removals never
    /// flip the changed verdict on their own.
    pub report_removed: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_PIXEL_THRESHOLD,
            report_removed: false,
        }
    }
}

/// Comparison failure.
#[derive(Debug, Error)]
pub enum DetectError {
    /// The stored baseline and the configured observation mode disagree.
    /// Resolved administratively (`pagewatch reset`), never by diffing.
    #[error("cannot compare a {baseline} baseline against a {current} observation")]
    KindMismatch {
        baseline: ObservationKind,
        current: ObservationKind,
    },
    #[error("highlight artifact could not be encoded: {0}")]
    Artifact(#[from] image::ImageError),
}

/// Variant-specific description of what changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Delta {
    /// Nothing changed.
    None,
    Render(RenderDelta),
    Text(ItemDelta),
    Labels(ItemDelta),
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        match self {
            Delta::None => true,
            Delta::Render(d) => d.changed_pixels == 0 && d.resized.is_none(),
            Delta::Text(d) | Delta::Labels(d) => d.added.is_empty() && d.removed.is_empty(),
        }
    }
}

/// Pixel-level delta for render observations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderDelta {
    /// Number of pixels whose thresholded difference was non-zero.
    pub changed_pixels: u64,
    /// Bounding box of the changed pixels, if any.
    pub region: Option<PixelRegion>,
    /// Set when the two frames had different dimensions; such frames
    /// cannot be diffed pixel-by-pixel and count as changed outright.
    pub resized: Option<Resize>,
    /// The per-channel threshold that was applied.
    pub threshold: u8,
}

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Frame dimension change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resize {
    pub from: (u32, u32),
    pub to: (u32, u32),
}

/// Added/removed items for text and label observations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemDelta {
    /// Items present now but absent from the baseline.
    pub added: Vec<String>,
    /// Items present in the baseline but gone now. Only populated when
    /// `report_removed` is set; informational, never notifiable alone.
    pub removed: Vec<String>,
}

/// Outcome of one comparison.
///
/// Invariant: `changed == false` ⇔ the delta is empty. A changed verdict
/// with nothing to show is a defect.
#[derive(Debug, Clone)]
pub struct ChangeResult {
    pub changed: bool,
    pub delta: Delta,
    /// PNG highlight of the changed pixels, for human review only.
    pub artifact: Option<Vec<u8>>,
}

impl ChangeResult {
    pub(crate) fn unchanged() -> Self {
        Self {
            changed: false,
            delta: Delta::None,
            artifact: None,
        }
    }

    /// One-line human description of the result.
    pub fn summary(&self) -> String {
        match &self.delta {
            Delta::None => "no change".to_string(),
            Delta::Render(d) => match (&d.resized, &d.region) {
                (Some(r), _) => format!(
                    "frame resized from {}x{} to {}x{}",
                    r.from.0, r.from.1, r.to.0, r.to.1
                ),
                (None, Some(region)) => format!(
                    "{} pixels changed in a {}x{} region at ({}, {})",
                    d.changed_pixels, region.width, region.height, region.x, region.y
                ),
                (None, None) => "no change".to_string(),
            },
            Delta::Text(d) => format!(
                "{} new line(s){}",
                d.added.len(),
                if d.removed.is_empty() {
                    String::new()
                } else {
                    format!(", {} removed", d.removed.len())
                }
            ),
            Delta::Labels(d) => format!(
                "new label(s): {}{}",
                d.added.join(", "),
                if d.removed.is_empty() {
                    String::new()
                } else {
                    format!(" ({} removed)", d.removed.len())
                }
            ),
        }
    }
}

/// Compare the current observation against the baseline.
///
/// An absent baseline is the bootstrap case and is never a change; the
/// reconciler persists the first observation silently.
pub fn detect(
    baseline: Option<&Observation>,
    current: &Observation,
    opts: &DetectOptions,
) -> Result<ChangeResult, DetectError> {
    let Some(baseline) = baseline else {
        return Ok(ChangeResult::unchanged());
    };

    match (baseline, current) {
        (Observation::Render(a), Observation::Render(b)) => render::diff_frames(a, b, opts),
        (Observation::Text(a), Observation::Text(b)) => Ok(text::diff_lines(a, b, opts)),
        (Observation::Labels(a), Observation::Labels(b)) => Ok(labels::diff_labels(a, b, opts)),
        _ => Err(DetectError::KindMismatch {
            baseline: baseline.kind(),
            current: current.kind(),
        }),
    }
}
