use thiserror::Error;

use crate::{rect::RectId, rows::LineId};

#[derive(Error, Debug)]
pub enum OtolithError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("No scale factor established for the current image")]
    UninitializedScale,

    #[error("Invalid scale factor {0}: must lie in (0, 1]")]
    InvalidScale(f64),

    #[error("Invalid rectangle after mapping: ({x1}, {y1}, {x2}, {y2})")]
    InvalidRectangle { x1: f64, y1: f64, x2: f64, y2: f64 },

    #[error("Line would cross locked line {locked}")]
    ForbiddenCrossing { locked: LineId },

    #[error("Crop region for rectangle {0} is empty after clamping")]
    EmptyCropRegion(RectId),

    #[error("Unknown rectangle {0}")]
    UnknownRectangle(RectId),

    #[error("Unknown line {0}")]
    UnknownLine(LineId),

    #[error("Line {0} is locked")]
    LineLocked(LineId),

    #[error("Invalid detection record: {0}")]
    InvalidDetection(String),

    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,

    #[error("Failed to load image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OtolithError>;
