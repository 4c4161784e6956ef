//! Removal of near-duplicate detections by intersection-over-union.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rect::Rectangle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DedupConfig {
    /// Pairs overlapping strictly more than this are duplicates
    #[schemars(range(min = 0.0, max = 1.0))]
    pub iou_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { iou_threshold: 0.6 }
    }
}

/// The most-overlapping pair above `threshold`, as `(i, j, iou)` with `i < j`.
/// Equal overlaps resolve to the first pair in scan order.
fn worst_pair(rects: &[Rectangle], threshold: f64) -> Option<(usize, usize, f64)> {
    let mut worst: Option<(usize, usize, f64)> = None;
    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            let iou = rects[i].iou(&rects[j]);
            if iou > threshold && worst.map_or(true, |(_, _, w)| iou > w) {
                worst = Some((i, j, iou));
            }
        }
    }
    worst
}

/// Drop redundant detections of the same object.
///
/// The pair with the highest IoU is resolved first by discarding its smaller
/// rectangle (the later one on equal area), then the whole set is rescanned,
/// until no pair exceeds the threshold. Input order is preserved.
pub fn deduplicate(rects: Vec<Rectangle>, config: &DedupConfig) -> Vec<Rectangle> {
    let mut rects = rects;
    let before = rects.len();

    while let Some((i, j, iou)) = worst_pair(&rects, config.iou_threshold) {
        let drop = if rects[j].area() > rects[i].area() { i } else { j };
        let keep = if drop == i { j } else { i };
        debug!(
            "Dropping {} (IoU {:.3} with {})",
            rects[drop].id(),
            iou,
            rects[keep].id()
        );
        rects.remove(drop);
    }

    debug!("Deduplication kept {} of {} rectangles", rects.len(), before);
    rects
}
