use std::path::{Path, PathBuf};

use otolith::{EngineConfig, ImageCropper, JsonDetections, JsonExportSink, OtolithError, Session};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum OtolithCliError {
    #[error(transparent)]
    Engine(#[from] OtolithError),
    #[error("Image {0} has zero width or height")]
    EmptyImage(PathBuf),
}

/// One tray photograph to cut into specimen crops
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProcessJob {
    pub image: PathBuf,
    /// Detections in original-image pixels, unless `detections_in_preview` is set
    pub detections: PathBuf,
    pub output_dir: PathBuf,
    pub config: Option<PathBuf>,
    /// Where to write the JSON export list; defaults to `crops.json` in `output_dir`
    pub export: Option<PathBuf>,
    #[serde(default)]
    pub detections_in_preview: bool,
}

/// What a processing run produced
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ProcessSummary {
    pub scale: f64,
    pub rectangles: usize,
    pub rows: usize,
    pub crops: usize,
    pub export_list: PathBuf,
}

impl ProcessJob {
    pub fn load_config(&self) -> Result<EngineConfig, OtolithCliError> {
        match &self.config {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Ok(EngineConfig::from_file(path)?)
            }
            None => Ok(EngineConfig::default()),
        }
    }

    pub fn export_path(&self) -> PathBuf {
        self.export
            .clone()
            .unwrap_or_else(|| self.output_dir.join("crops.json"))
    }

    /// Detect, deduplicate, fit rows automatically and write every crop
    pub fn run(&self) -> Result<ProcessSummary, OtolithCliError> {
        let config = self.load_config()?;
        let mut cropper = ImageCropper::open(&self.image, &self.output_dir)?;
        let (width, height) = cropper.dimensions();
        if width == 0 || height == 0 {
            return Err(OtolithCliError::EmptyImage(self.image.clone()));
        }

        let mut session = Session::new(config);
        let scale = session.load_image(width, height)?;
        info!("Image {} is {}x{}, preview scale {:.4}", self.image.display(), width, height, scale);

        let detections = JsonDetections::from_file(&self.detections)?;
        let detections = if self.detections_in_preview {
            detections
        } else {
            detections.scaled(scale)
        };
        let rectangles = session.detect(&detections)?;
        if rectangles == 0 {
            warn!("No detections passed the filter; nothing to crop");
        }

        let crops = session.export(&mut cropper)?;

        let export_list = self.export_path();
        session.export(&mut JsonExportSink::new(&export_list))?;

        Ok(ProcessSummary {
            scale,
            rectangles,
            rows: session.rows().iter().filter(|l| !l.members().is_empty()).count(),
            crops,
            export_list,
        })
    }
}

/// Write the default configuration as TOML
pub fn write_default_config<P: AsRef<Path>>(path: P) -> Result<(), OtolithCliError> {
    EngineConfig::default().to_toml_file(path)?;
    Ok(())
}
