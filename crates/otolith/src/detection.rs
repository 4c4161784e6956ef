use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::rect::Rectangle;

/// One raw candidate from the object detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawDetection {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub confidence: f32,
    pub class_id: u32,
}

impl RawDetection {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f32, class_id: u32) -> Self {
        Self { x1, y1, x2, y2, confidence, class_id }
    }

    /// Map the box through `f`, keeping score and class
    pub fn map_coords(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            x1: f(self.x1),
            y1: f(self.y1),
            x2: f(self.x2),
            y2: f(self.y2),
            ..self
        }
    }
}

/// Black-box object detector
pub trait Detector: Send + Sync {
    fn detect(&self) -> Result<Vec<RawDetection>>;
}

/// Confidence and class gate applied before deduplication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DetectionFilter {
    /// Detections must score strictly above this
    #[schemars(range(min = 0.0, max = 1.0))]
    pub confidence_threshold: f32,
    /// The single class id treated as a specimen
    pub target_class: u32,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.2,
            target_class: 1,
        }
    }
}

impl DetectionFilter {
    pub fn accepts(&self, detection: &RawDetection) -> bool {
        detection.confidence > self.confidence_threshold && detection.class_id == self.target_class
    }

    /// Keep accepted detections, in detector order, as rectangles.
    /// Boxes with invalid geometry are skipped.
    pub fn apply(&self, detections: &[RawDetection]) -> Vec<Rectangle> {
        let rects: Vec<Rectangle> = detections
            .iter()
            .filter(|d| self.accepts(d))
            .filter_map(|d| match Rectangle::new(d.x1, d.y1, d.x2, d.y2) {
                Ok(rect) => Some(rect.with_confidence(d.confidence)),
                Err(e) => {
                    warn!("Skipping detection {:?}: {}", d, e);
                    None
                }
            })
            .collect();
        debug!(
            "Detection filter kept {} of {} candidates",
            rects.len(),
            detections.len()
        );
        rects
    }
}
