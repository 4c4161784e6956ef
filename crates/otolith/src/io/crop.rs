use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::{info, warn};

use crate::error::Result;
use crate::extraction::{CropDescriptor, ExportSink};

/// Cuts each crop out of the full-resolution image and saves it as PNG
#[derive(Debug, Clone)]
pub struct ImageCropper {
    image: DynamicImage,
    output_dir: PathBuf,
    written: Vec<PathBuf>,
}

impl ImageCropper {
    pub fn new<P: AsRef<Path>>(image: DynamicImage, output_dir: P) -> Self {
        Self {
            image,
            output_dir: output_dir.as_ref().to_path_buf(),
            written: Vec::new(),
        }
    }

    /// Load the original image from disk
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(image_path: P, output_dir: Q) -> Result<Self> {
        Ok(Self::new(image::open(image_path)?, output_dir))
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Files written by the last export
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ExportSink for ImageCropper {
    fn export(&mut self, crops: &[CropDescriptor]) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        self.written.clear();
        let (width, height) = self.dimensions();
        for crop in crops {
            let region = crop.original_rect;
            if region.is_empty() || region.x2 > width || region.y2 > height {
                warn!("Skipping {}: region {} lies outside the image", crop.suggested_name, region);
                continue;
            }
            let path = self.output_dir.join(format!("{}.png", crop.suggested_name));
            self.image
                .crop_imm(region.x1, region.y1, region.width(), region.height())
                .save(&path)?;
            self.written.push(path);
        }
        info!("Saved {} crops to {}", self.written.len(), self.output_dir.display());
        Ok(())
    }
}
