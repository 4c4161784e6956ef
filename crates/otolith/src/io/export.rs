use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::extraction::{CropDescriptor, ExportRecord, ExportSink};

/// Writes the export list as a JSON array of [`ExportRecord`]s
#[derive(Debug, Clone)]
pub struct JsonExportSink {
    path: PathBuf,
}

impl JsonExportSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(crops: &[CropDescriptor]) -> Vec<ExportRecord> {
        crops.iter().map(ExportRecord::from).collect()
    }
}

impl ExportSink for JsonExportSink {
    fn export(&mut self, crops: &[CropDescriptor]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&Self::records(crops))?;
        fs::write(&self.path, content)?;
        info!("Wrote {} export records to {}", crops.len(), self.path.display());
        Ok(())
    }
}
