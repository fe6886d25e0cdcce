use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::TextLine;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceOptions {
    /// Lines scoring below this are dropped.
    pub confidence_threshold: f32,
    /// Height in pixels of the bands lines are grouped into rows by. Zero
    /// disables banding and orders by raw `y_min`.
    pub row_tolerance: u32,
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            row_tolerance: 15,
        }
    }
}

/// Row key for a line starting at `y_min`: `y_min` snapped to the nearest
/// multiple of `row_tolerance`.
pub fn row_group(y_min: i32, row_tolerance: u32) -> i64 {
    if row_tolerance == 0 {
        return i64::from(y_min);
    }
    let bands = (f64::from(y_min) / f64::from(row_tolerance)).round() as i64;
    bands * i64::from(row_tolerance)
}

fn passes_gate(confidence: f32, threshold: f32) -> bool {
    // NaN never passes
    confidence >= threshold
}

/// Filters, clamps and orders parsed lines for a `width` x `height` page.
///
/// Lines under the confidence threshold are dropped, boxes are clamped to the
/// page and lines whose boxes collapse are dropped. The rest are sorted top to
/// bottom by row band, then left to right. The sort is stable so lines that
/// share a band and `x_min` keep their engine order.
#[instrument(level = "debug", skip(lines), fields(count = lines.len()))]
pub fn validate_and_sequence(
    lines: Vec<TextLine>,
    width: u32,
    height: u32,
    options: &SequenceOptions,
) -> Vec<TextLine> {
    let SequenceOptions {
        confidence_threshold,
        row_tolerance,
    } = *options;

    let mut lines = lines
        .into_iter()
        .filter(|line| {
            let keep = passes_gate(line.confidence, confidence_threshold);
            if !keep {
                log::trace!(
                    "Dropping {:?}: confidence {} below {confidence_threshold}",
                    line.text,
                    line.confidence
                );
            }
            keep
        })
        .filter_map(|line| line.clamped(width, height))
        .collect::<Vec<_>>();

    lines.sort_by_key(|line| (row_group(line.bbox.y_min(), row_tolerance), line.bbox.x_min()));
    lines
}
