use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::detection::{Detector, RawDetection};
use crate::error::{OtolithError, Result};

/// Either `[x1, y1, x2, y2, confidence, class]` or a keyed object
#[derive(Deserialize)]
#[serde(untagged)]
enum DetectionRecord {
    Row([f64; 6]),
    Object(RawDetection),
}

impl TryFrom<DetectionRecord> for RawDetection {
    type Error = OtolithError;

    fn try_from(record: DetectionRecord) -> Result<Self> {
        match record {
            DetectionRecord::Row([x1, y1, x2, y2, confidence, class]) => {
                if !(class.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&class)) {
                    return Err(OtolithError::InvalidDetection(format!(
                        "class {class} is not a non-negative integer"
                    )));
                }
                Ok(RawDetection::new(x1, y1, x2, y2, confidence as f32, class as u32))
            }
            DetectionRecord::Object(detection) => Ok(detection),
        }
    }
}

/// Detections exported by an external model run, read from JSON
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonDetections {
    detections: Vec<RawDetection>,
}

impl JsonDetections {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self { detections }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let records: Vec<DetectionRecord> = serde_json::from_str(content)?;
        let detections = records
            .into_iter()
            .map(RawDetection::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(detections))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let detections = Self::from_json(&content)?;
        debug!("Read {} detections from {}", detections.len(), path.as_ref().display());
        Ok(detections)
    }

    /// Multiply every coordinate by `scale`, e.g. original pixels to preview
    pub fn scaled(self, scale: f64) -> Self {
        Self::new(
            self.detections
                .into_iter()
                .map(|d| d.map_coords(|v| v * scale))
                .collect(),
        )
    }

    pub fn detections(&self) -> &[RawDetection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

impl Detector for JsonDetections {
    fn detect(&self) -> Result<Vec<RawDetection>> {
        Ok(self.detections.clone())
    }
}
