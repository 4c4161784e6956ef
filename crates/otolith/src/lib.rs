//! # Otolith row annotation engine
//!
//! Geometry core for cutting individual specimens out of a photograph where
//! many of them lie in rows. Detections are deduplicated into rectangles,
//! rectangles are grouped into rows by fitted or hand-drawn row lines, and
//! the rows are read out top to bottom, left to right, as crop regions in
//! the original image's pixels.
//!
//! ## Core Features
//!
//! - **Deduplication**: drop near-duplicate detections by IoU
//! - **Automatic rows**: band clustering and least-squares line fitting
//! - **Interactive rows**: draw, drag, lock and delete row lines; locked lines never cross
//! - **Extraction**: stable reading order and outward pixel snapping
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use otolith::{EngineConfig, ImageCropper, JsonDetections, Session};
//!
//! let mut cropper = ImageCropper::open("tray.jpg", "crops")?;
//! let (width, height) = cropper.dimensions();
//!
//! let mut session = Session::new(EngineConfig::default());
//! let scale = session.load_image(width, height)?;
//! session.detect(&JsonDetections::from_file("detections.json")?.scaled(scale))?;
//! session.export(&mut cropper)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod dedup;
pub mod detection;
pub mod error;
pub mod extraction;
pub mod io;
pub mod mapper;
pub mod rect;
pub mod rows;
pub mod session;
pub mod types;

pub use config::{DisplayBudget, EngineConfig};
pub use dedup::{deduplicate, DedupConfig};
pub use detection::{DetectionFilter, Detector, RawDetection};
pub use error::{OtolithError, Result};
pub use extraction::{CropDescriptor, ExportRecord, ExportSink, ExtractionOrderer, PixelRect};
pub use io::*;
pub use mapper::{CoordinateMapper, ImageScale};
pub use rect::{RectId, Rectangle, RectangleSet};
pub use rows::{
    detect_rows, ClusterReport, DragContext, EditMode, EditOutcome, Editor, Endpoint, LineId,
    LineOrigin, OrphanPolicy, RowConfig, RowLine, RowSet,
};
pub use session::{RowMode, Session, SessionCommand, Snapshot};
pub use types::{Corner, Point};
