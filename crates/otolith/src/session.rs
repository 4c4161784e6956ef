//! The single owner of annotation state for one image.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::dedup::deduplicate;
use crate::detection::{Detector, RawDetection};
use crate::error::{OtolithError, Result};
use crate::extraction::{CropDescriptor, ExportSink, ExtractionOrderer};
use crate::mapper::CoordinateMapper;
use crate::rect::{RectId, Rectangle, RectangleSet};
use crate::rows::{
    detect_rows, ClusterReport, EditMode, EditOutcome, Editor, LineId, OrphanPolicy, RowSet,
};
use crate::types::Point;

/// How rows follow rectangle edits
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RowMode {
    /// Unlocked lines are refitted whenever rectangles change
    #[default]
    Automatic,
    /// Lines only change when edited; membership is recomputed
    Interactive,
}

impl RowMode {
    fn orphan_policy(self) -> OrphanPolicy {
        match self {
            RowMode::Automatic => OrphanPolicy::NearestUnlocked,
            RowMode::Interactive => OrphanPolicy::Leave,
        }
    }
}

#[derive(
    Debug, Clone,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq
)]
#[serde(tag = "type", content = "params")]
#[strum(serialize_all = "snake_case")]
pub enum SessionCommand {
    /// Refit unlocked row lines from the current rectangles
    #[serde(rename = "detect_rows")]
    DetectRows,

    /// Rebuild row membership from the current line geometry
    #[serde(rename = "recompute_membership")]
    RecomputeMembership,

    /// Lock a line; without an id, the line just drawn
    #[serde(rename = "finalize_line")]
    FinalizeLine { line: Option<LineId> },

    #[serde(rename = "delete_line")]
    DeleteLine { line: LineId },

    #[serde(rename = "delete_rectangle")]
    DeleteRectangle { rect: RectId },

    #[serde(rename = "set_edit_mode")]
    SetEditMode { mode: EditMode },

    #[serde(rename = "set_row_mode")]
    SetRowMode { mode: RowMode },

    /// Abandon the gesture in progress and any unfinalized line
    #[serde(rename = "cancel_gesture")]
    CancelGesture,

    /// Remove every line, locked ones included
    #[serde(rename = "clear_rows")]
    ClearRows,
}

impl SessionCommand {
    /// Get the JSON schema for all commands
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(SessionCommand)
    }

    /// Get a list of all available command names
    pub fn command_names() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::DetectRows => "Refit unlocked row lines from the current rectangles, keeping locked lines",
            Self::RecomputeMembership => "Reassign every rectangle to the row line passing through it",
            Self::FinalizeLine { .. } => "Lock a row line so no other locked line may cross it",
            Self::DeleteLine { .. } => "Delete a row line, locked or not; its rectangles become unclaimed",
            Self::DeleteRectangle { .. } => "Delete a rectangle and remove it from its row",
            Self::SetEditMode { .. } => "Switch the interaction mode, abandoning any gesture in progress",
            Self::SetRowMode { .. } => "Choose automatic or interactive row assignment",
            Self::CancelGesture => "Abandon the gesture in progress and any unfinalized line",
            Self::ClearRows => "Remove every row line",
        }
    }
}

/// Read-only view for a renderer
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub rects: &'a RectangleSet,
    pub rows: &'a RowSet,
    pub provisional_segment: Option<(Point, Point)>,
    pub provisional_box: Option<(Point, Point)>,
    pub edit_mode: EditMode,
    pub row_mode: RowMode,
}

/// Annotation state for one image.
///
/// Rectangles and row lines live in preview coordinates; the mapper converts
/// to original pixels on extraction. Any structural change is followed by a
/// full recomputation: in [`RowMode::Automatic`] rectangle changes refit the
/// unlocked lines, otherwise membership is rebuilt from the line geometry.
#[derive(Debug, Clone, Default)]
pub struct Session {
    config: EngineConfig,
    rects: RectangleSet,
    rows: RowSet,
    mapper: CoordinateMapper,
    editor: Editor,
    row_mode: RowMode,
}

impl Session {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rects(&self) -> &RectangleSet {
        &self.rects
    }

    pub fn rows(&self) -> &RowSet {
        &self.rows
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn row_mode(&self) -> RowMode {
        self.row_mode
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            rects: &self.rects,
            rows: &self.rows,
            provisional_segment: self.editor.provisional_segment(),
            provisional_box: self.editor.provisional_box(),
            edit_mode: self.editor.mode(),
            row_mode: self.row_mode,
        }
    }

    /// Start a new image, choosing the preview scale from the display budget.
    /// Returns the scale.
    pub fn load_image(&mut self, width: u32, height: u32) -> Result<f64> {
        let scale = CoordinateMapper::fit_scale(width, height, &self.config.display);
        self.load_image_with_scale(scale, width, height)?;
        Ok(scale)
    }

    /// Start a new image at an explicit preview scale. All rectangles, lines
    /// and gesture state from the previous image are dropped.
    pub fn load_image_with_scale(&mut self, scale: f64, width: u32, height: u32) -> Result<()> {
        self.mapper.set_image(scale, width, height)?;
        self.rects.clear();
        self.rows.clear();
        self.editor.reset();
        info!("Loaded {}x{} image, preview scale {:.4}", width, height, scale);
        Ok(())
    }

    /// Filter, deduplicate and add detections given in preview coordinates.
    /// Returns how many rectangles were added.
    pub fn ingest_detections(&mut self, detections: &[RawDetection]) -> usize {
        let candidates = self.config.detection.apply(detections);
        let kept = deduplicate(candidates, &self.config.dedup);
        let added = kept.len();
        for rect in kept {
            self.rects.insert(rect);
        }
        info!("Added {} rectangles from {} detections", added, detections.len());
        if added > 0 {
            self.after_rect_change();
        }
        added
    }

    pub fn detect<D: Detector>(&mut self, detector: &D) -> Result<usize> {
        let detections = detector.detect()?;
        Ok(self.ingest_detections(&detections))
    }

    pub fn add_rectangle(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) -> Result<RectId> {
        let id = self.rects.insert(Rectangle::new(x1, y1, x2, y2)?);
        self.after_rect_change();
        Ok(id)
    }

    pub fn delete_rectangle(&mut self, id: RectId) -> Result<()> {
        self.rects.remove(id).ok_or(OtolithError::UnknownRectangle(id))?;
        self.rows.release(id);
        self.after_rect_change();
        Ok(())
    }

    /// Refit unlocked lines. A pending hand-drawn line is unlocked and goes too.
    pub fn detect_rows(&mut self) -> ClusterReport {
        let report = detect_rows(&self.rects, &mut self.rows, &self.config.rows);
        self.editor.forget_removed(&self.rows);
        report
    }

    pub fn recompute_membership(&mut self) {
        self.rows
            .recompute_membership(&self.rects, self.row_mode.orphan_policy());
    }

    pub fn set_row_mode(&mut self, mode: RowMode) {
        self.row_mode = mode;
        debug!("Row mode set to {}", mode);
        match mode {
            RowMode::Automatic => {
                self.detect_rows();
            }
            RowMode::Interactive => self.recompute_membership(),
        }
    }

    pub fn set_edit_mode(&mut self, mode: EditMode) {
        if self.editor.set_mode(mode, &mut self.rows).is_some() {
            self.recompute_membership();
        }
    }

    pub fn cancel_gesture(&mut self) {
        if self.editor.cancel(&mut self.rows).is_some() {
            self.recompute_membership();
        }
    }

    /// Lock `line`, or the line just drawn when `None`
    pub fn finalize_line(&mut self, line: Option<LineId>) -> Result<LineId> {
        match line {
            Some(id) if self.editor.pending_line() != Some(id) => {
                self.rows.lock(id)?;
                Ok(id)
            }
            _ => self.editor.finalize(&mut self.rows),
        }
    }

    pub fn delete_line(&mut self, id: LineId) -> Result<()> {
        self.rows.remove(id).ok_or(OtolithError::UnknownLine(id))?;
        self.editor.forget_removed(&self.rows);
        self.recompute_membership();
        Ok(())
    }

    pub fn clear_rows(&mut self) {
        self.rows.clear();
        self.editor.reset();
    }

    pub fn press(&mut self, at: Point) -> Result<EditOutcome> {
        let outcome = self
            .editor
            .press(at, &mut self.rects, &mut self.rows, &self.config.rows)?;
        self.after_edit(outcome);
        Ok(outcome)
    }

    pub fn drag(&mut self, to: Point) -> Result<EditOutcome> {
        let outcome = self
            .editor
            .drag(to, &mut self.rects, &mut self.rows, &self.config.rows)?;
        self.after_edit(outcome);
        Ok(outcome)
    }

    pub fn release(&mut self, at: Point) -> Result<EditOutcome> {
        let outcome = self
            .editor
            .release(at, &mut self.rects, &mut self.rows, &self.config.rows)?;
        self.after_edit(outcome);
        Ok(outcome)
    }

    /// Crops in reading order
    pub fn extract(&self) -> Result<Vec<CropDescriptor>> {
        ExtractionOrderer::new(self.config.rows.horizontal_epsilon).order(
            &self.rows,
            &self.rects,
            &self.mapper,
        )
    }

    /// Extract and hand the crops to `sink`. Returns how many were exported.
    pub fn export(&self, sink: &mut dyn ExportSink) -> Result<usize> {
        let crops = self.extract()?;
        sink.export(&crops)?;
        Ok(crops.len())
    }

    pub fn execute(&mut self, command: SessionCommand) -> Result<()> {
        debug!("Executing {}", command);
        match command {
            SessionCommand::DetectRows => {
                self.detect_rows();
            }
            SessionCommand::RecomputeMembership => self.recompute_membership(),
            SessionCommand::FinalizeLine { line } => {
                self.finalize_line(line)?;
            }
            SessionCommand::DeleteLine { line } => self.delete_line(line)?,
            SessionCommand::DeleteRectangle { rect } => self.delete_rectangle(rect)?,
            SessionCommand::SetEditMode { mode } => self.set_edit_mode(mode),
            SessionCommand::SetRowMode { mode } => self.set_row_mode(mode),
            SessionCommand::CancelGesture => self.cancel_gesture(),
            SessionCommand::ClearRows => self.clear_rows(),
        }
        Ok(())
    }

    fn after_edit(&mut self, outcome: EditOutcome) {
        if outcome.touches_rects() {
            self.after_rect_change();
        } else if outcome.touches_lines() {
            self.recompute_membership();
        }
    }

    fn after_rect_change(&mut self) {
        match self.row_mode {
            RowMode::Automatic => {
                self.detect_rows();
            }
            RowMode::Interactive => self.recompute_membership(),
        }
    }
}
