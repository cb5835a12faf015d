//! Pixel-level frame comparison with a noise threshold and a highlight
//! artifact for human review.

use super::{ChangeResult, Delta, DetectError, DetectOptions, PixelRegion, RenderDelta, Resize};
use crate::observation::RenderFrame;
use std::io::Cursor;

/// Compare two frames pixel by pixel.
///
/// A pixel counts as changed iff any RGBA channel differs by at least the
/// configured threshold. A dimension mismatch cannot be diffed and counts
/// as a change outright, carried as a dedicated resize delta.
pub(crate) fn diff_frames(
    baseline: &RenderFrame,
    current: &RenderFrame,
    opts: &DetectOptions,
) -> Result<ChangeResult, DetectError> {
    if baseline.width() != current.width() || baseline.height() != current.height() {
        return Ok(ChangeResult {
            changed: true,
            delta: Delta::Render(RenderDelta {
                changed_pixels: 0,
                region: None,
                resized: Some(Resize {
                    from: (baseline.width(), baseline.height()),
                    to: (current.width(), current.height()),
                }),
                threshold: opts.threshold,
            }),
            artifact: None,
        });
    }

    // Threshold 0 would flag every pixel including identical ones.
    let threshold = opts.threshold.max(1);

    let (width, height) = (current.width(), current.height());
    let mut changed_pixels = 0u64;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (width, height, 0u32, 0u32);
    let mut highlight = current.image.clone();

    for y in 0..height {
        for x in 0..width {
            let a = baseline.image.get_pixel(x, y);
            let b = current.image.get_pixel(x, y);
            let exceeds = a
                .0
                .iter()
                .zip(b.0.iter())
                .any(|(&ca, &cb)| ca.abs_diff(cb) >= threshold);
            if !exceeds {
                continue;
            }

            changed_pixels += 1;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            // Semi-transparent red marker over the changed pixel.
            let p = highlight.get_pixel_mut(x, y);
            p.0[0] = (p.0[0] / 2).saturating_add(128);
            p.0[1] /= 2;
            p.0[2] /= 2;
        }
    }

    if changed_pixels == 0 {
        return Ok(ChangeResult::unchanged());
    }

    let mut artifact = Vec::new();
    highlight.write_to(&mut Cursor::new(&mut artifact), image::ImageFormat::Png)?;

    Ok(ChangeResult {
        changed: true,
        delta: Delta::Render(RenderDelta {
            changed_pixels,
            region: Some(PixelRegion {
                x: min_x,
                y: min_y,
                width: max_x - min_x + 1,
                height: max_y - min_y + 1,
            }),
            resized: None,
            threshold,
        }),
        artifact: Some(artifact),
    })
}
