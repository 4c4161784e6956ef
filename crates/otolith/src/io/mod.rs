//! File-backed collaborators around the engine: a JSON detection source and
//! the export sinks.

pub mod crop;
pub mod detections;
pub mod export;

pub use crop::ImageCropper;
pub use detections::JsonDetections;
pub use export::JsonExportSink;
