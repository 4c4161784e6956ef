//! Reading-order extraction: rows top to bottom, boxes left to right,
//! each mapped to whole original-image pixels.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{OtolithError, Result};
use crate::mapper::CoordinateMapper;
use crate::rect::{RectId, Rectangle, RectangleSet};
use crate::rows::{RowLine, RowSet};

/// Crop region in original-image pixels, half-open on the far edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PixelRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

impl fmt::Display for PixelRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x1, self.y1, self.x2, self.y2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CropDescriptor {
    pub row_index: usize,
    pub box_index: usize,
    pub rect_id: RectId,
    pub original_rect: PixelRect,
    /// File stem, `row_RR_box_BB`
    pub suggested_name: String,
}

/// One line of the export list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExportRecord {
    pub row: usize,
    #[serde(rename = "box")]
    pub box_index: usize,
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub filename: String,
}

impl From<&CropDescriptor> for ExportRecord {
    fn from(crop: &CropDescriptor) -> Self {
        Self {
            row: crop.row_index,
            box_index: crop.box_index,
            x1: crop.original_rect.x1,
            y1: crop.original_rect.y1,
            x2: crop.original_rect.x2,
            y2: crop.original_rect.y2,
            filename: format!("{}.png", crop.suggested_name),
        }
    }
}

/// Destination for ordered crops
pub trait ExportSink {
    fn export(&mut self, crops: &[CropDescriptor]) -> Result<()>;
}

/// Name for the crop at `(row, box)`
pub fn crop_name(row_index: usize, box_index: usize) -> String {
    format!("row_{:02}_box_{:02}", row_index, box_index)
}

/// Snap a mapped region outward to whole pixels inside `width × height`
pub fn snap_outward(coords: [f64; 4], width: u32, height: u32) -> PixelRect {
    let [x1, y1, x2, y2] = coords;
    let clamp = |v: f64, max: u32| v.max(0.0).min(f64::from(max)) as u32;
    PixelRect {
        x1: clamp(x1.floor(), width),
        y1: clamp(y1.floor(), height),
        x2: clamp(x2.ceil(), width),
        y2: clamp(y2.ceil(), height),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionOrderer {
    /// Rows flatter than this sort by intercept
    pub horizontal_epsilon: f64,
}

impl Default for ExtractionOrderer {
    fn default() -> Self {
        Self { horizontal_epsilon: 0.01 }
    }
}

impl ExtractionOrderer {
    pub fn new(horizontal_epsilon: f64) -> Self {
        Self { horizontal_epsilon }
    }

    /// Vertical sort key of a non-empty row
    fn row_key(&self, line: &RowLine, rects: &RectangleSet) -> f64 {
        match (line.slope(), line.intercept()) {
            (Some(slope), Some(intercept)) if slope.abs() < self.horizontal_epsilon => intercept,
            _ => line
                .members()
                .iter()
                .filter_map(|id| rects.get(*id))
                .map(Rectangle::y1)
                .fold(f64::INFINITY, f64::min),
        }
    }

    /// Produce crop descriptors in reading order.
    ///
    /// Empty rows are ignored. Boxes whose region is empty once mapped and
    /// clamped are skipped with a warning; `box_index` still counts them.
    pub fn order(
        &self,
        rows: &RowSet,
        rects: &RectangleSet,
        mapper: &CoordinateMapper,
    ) -> Result<Vec<CropDescriptor>> {
        let (width, height) = mapper.original_size()?;

        let mut ordered: Vec<(f64, &RowLine)> = rows
            .iter()
            .filter(|line| !line.members().is_empty())
            .map(|line| (self.row_key(line, rects), line))
            .collect();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut crops = Vec::new();
        for (row_index, (_, line)) in ordered.iter().enumerate() {
            let mut members: Vec<&Rectangle> =
                line.members().iter().filter_map(|id| rects.get(*id)).collect();
            members.sort_by(|a, b| a.center().x.total_cmp(&b.center().x));

            for (box_index, rect) in members.into_iter().enumerate() {
                match crop_region(rect, mapper, width, height) {
                    Ok(original_rect) => crops.push(CropDescriptor {
                        row_index,
                        box_index,
                        rect_id: rect.id(),
                        original_rect,
                        suggested_name: crop_name(row_index, box_index),
                    }),
                    Err(e) => warn!("Skipping row {} box {}: {}", row_index, box_index, e),
                }
            }
        }

        let claimed = rows.claimed().count();
        if claimed < rects.len() {
            debug!("{} rectangles belong to no row and are not exported", rects.len() - claimed);
        }
        debug!("Ordered {} crops across {} rows", crops.len(), ordered.len());
        Ok(crops)
    }
}

fn crop_region(rect: &Rectangle, mapper: &CoordinateMapper, width: u32, height: u32) -> Result<PixelRect> {
    let mapped = mapper
        .rect_to_original(rect)
        .map_err(|_| OtolithError::EmptyCropRegion(rect.id()))?;
    let region = snap_outward(mapped, width, height);
    if region.is_empty() {
        return Err(OtolithError::EmptyCropRegion(rect.id()));
    }
    Ok(region)
}
