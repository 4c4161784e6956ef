//! Interactive editing as an explicit state machine: one [`EditMode`] plus at
//! most one [`DragContext`] describing the gesture in progress.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::debug;

use super::line::{Endpoint, LineId, LineOrigin};
use super::set::RowSet;
use super::RowConfig;
use crate::error::{OtolithError, Result};
use crate::rect::{RectId, Rectangle, RectangleSet};
use crate::types::{Corner, Point};

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EditMode {
    /// Draw a new row line
    #[default]
    AddLine,
    /// Drag an unlocked line's endpoint or body
    EditLine,
    /// Remove a line, or a rectangle when no line is near
    Delete,
    /// Draw a new rectangle
    AddBox,
    /// Move a rectangle, or resize it from a corner
    EditBox,
}

/// The gesture in progress between press and release
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragContext {
    DrawingLine { anchor: Point, current: Point },
    DraggingEndpoint { line: LineId, endpoint: Endpoint },
    DraggingLine { line: LineId, last: Point },
    DrawingBox { anchor: Point, current: Point },
    MovingBox { rect: RectId, last: Point },
    ResizingBox { rect: RectId, corner: Corner },
}

/// What an input event changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Unchanged,
    /// Only provisional geometry moved
    Preview,
    LineAdded(LineId),
    LineChanged(LineId),
    LineRemoved(LineId),
    RectAdded(RectId),
    RectChanged(RectId),
    RectRemoved(RectId),
}

impl EditOutcome {
    /// A line's geometry or existence changed
    pub fn touches_lines(&self) -> bool {
        matches!(
            self,
            EditOutcome::LineAdded(_) | EditOutcome::LineChanged(_) | EditOutcome::LineRemoved(_)
        )
    }

    /// A rectangle was added, moved, resized or removed
    pub fn touches_rects(&self) -> bool {
        matches!(
            self,
            EditOutcome::RectAdded(_) | EditOutcome::RectChanged(_) | EditOutcome::RectRemoved(_)
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Editor {
    mode: EditMode,
    context: Option<DragContext>,
    /// Manual line drawn but not yet finalized
    pending: Option<LineId>,
}

impl Editor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn drag_context(&self) -> Option<&DragContext> {
        self.context.as_ref()
    }

    pub fn pending_line(&self) -> Option<LineId> {
        self.pending
    }

    /// The line being drawn, for the renderer
    pub fn provisional_segment(&self) -> Option<(Point, Point)> {
        match self.context {
            Some(DragContext::DrawingLine { anchor, current }) => Some((anchor, current)),
            _ => None,
        }
    }

    /// The box being drawn, for the renderer
    pub fn provisional_box(&self) -> Option<(Point, Point)> {
        match self.context {
            Some(DragContext::DrawingBox { anchor, current }) => Some((anchor, current)),
            _ => None,
        }
    }

    /// Switch mode, abandoning any gesture and unfinalized line
    pub fn set_mode(&mut self, mode: EditMode, rows: &mut RowSet) -> Option<LineId> {
        let discarded = self.cancel(rows);
        self.mode = mode;
        discarded
    }

    /// Drop the gesture in progress and the pending line, if any.
    /// Locked lines are never touched. Returns the discarded line.
    pub fn cancel(&mut self, rows: &mut RowSet) -> Option<LineId> {
        self.context = None;
        let pending = self.pending.take()?;
        match rows.get(pending) {
            Some(line) if !line.is_locked() => {
                rows.remove(pending);
                debug!("Discarded unfinalized line {}", pending);
                Some(pending)
            }
            _ => None,
        }
    }

    /// Forget gesture state without touching any line, after the set was replaced
    pub fn reset(&mut self) {
        self.context = None;
        self.pending = None;
    }

    /// Drop references to lines that no longer exist, e.g. after a refit
    /// discarded the unlocked lines
    pub fn forget_removed(&mut self, rows: &RowSet) {
        if self.pending.is_some_and(|id| rows.get(id).is_none()) {
            debug!("Pending line {:?} was removed", self.pending);
            self.pending = None;
        }
        if let Some(
            DragContext::DraggingEndpoint { line, .. } | DragContext::DraggingLine { line, .. },
        ) = self.context
        {
            if rows.get(line).is_none() {
                self.context = None;
            }
        }
    }

    /// Lock the pending line
    pub fn finalize(&mut self, rows: &mut RowSet) -> Result<LineId> {
        let pending = self
            .pending
            .ok_or_else(|| OtolithError::InvalidGeometry("no line awaiting finalization".to_string()))?;
        rows.lock(pending)?;
        self.pending = None;
        Ok(pending)
    }

    pub fn press(
        &mut self,
        at: Point,
        rects: &mut RectangleSet,
        rows: &mut RowSet,
        config: &RowConfig,
    ) -> Result<EditOutcome> {
        self.context = None;
        match self.mode {
            EditMode::AddLine => {
                self.context = Some(DragContext::DrawingLine { anchor: at, current: at });
                Ok(EditOutcome::Preview)
            }
            EditMode::EditLine => {
                if let Some((line, endpoint)) = rows.pick_endpoint(at, config.endpoint_pick_tolerance) {
                    self.context = Some(DragContext::DraggingEndpoint { line, endpoint });
                } else if let Some(line) = rows.pick_line(at, config.line_pick_tolerance, false) {
                    self.context = Some(DragContext::DraggingLine { line, last: at });
                }
                Ok(EditOutcome::Unchanged)
            }
            EditMode::Delete => {
                if let Some(line) = rows.pick_line(at, config.line_pick_tolerance, true) {
                    rows.remove(line);
                    if self.pending == Some(line) {
                        self.pending = None;
                    }
                    debug!("Deleted line {}", line);
                    return Ok(EditOutcome::LineRemoved(line));
                }
                if let Some(rect) = rects.hit_test(at.x, at.y, 0.0) {
                    rects.remove(rect);
                    rows.release(rect);
                    debug!("Deleted rectangle {}", rect);
                    return Ok(EditOutcome::RectRemoved(rect));
                }
                Ok(EditOutcome::Unchanged)
            }
            EditMode::AddBox => {
                self.context = Some(DragContext::DrawingBox { anchor: at, current: at });
                Ok(EditOutcome::Preview)
            }
            EditMode::EditBox => {
                if let Some((rect, corner)) = rects.corner_hit(at.x, at.y, config.corner_pick_tolerance) {
                    rects.select(rect)?;
                    self.context = Some(DragContext::ResizingBox { rect, corner });
                } else if let Some(rect) = rects.hit_test(at.x, at.y, 0.0) {
                    rects.select(rect)?;
                    self.context = Some(DragContext::MovingBox { rect, last: at });
                } else {
                    rects.clear_selection();
                }
                Ok(EditOutcome::Unchanged)
            }
        }
    }

    /// Apply one drag frame. A rejected frame leaves the geometry where it
    /// was and keeps the gesture alive.
    pub fn drag(
        &mut self,
        to: Point,
        rects: &mut RectangleSet,
        rows: &mut RowSet,
        config: &RowConfig,
    ) -> Result<EditOutcome> {
        let Some(context) = self.context.as_mut() else {
            return Ok(EditOutcome::Unchanged);
        };
        match context {
            DragContext::DrawingLine { current, .. } | DragContext::DrawingBox { current, .. } => {
                *current = to;
                Ok(EditOutcome::Preview)
            }
            DragContext::DraggingEndpoint { line, endpoint } => {
                rows.move_endpoint(*line, *endpoint, to, config.min_line_length)?;
                Ok(EditOutcome::LineChanged(*line))
            }
            DragContext::DraggingLine { line, last } => {
                rows.translate(*line, to.x - last.x, to.y - last.y, config.min_line_length)?;
                *last = to;
                Ok(EditOutcome::LineChanged(*line))
            }
            DragContext::MovingBox { rect, last } => {
                let (dx, dy) = rects.translate(*rect, to.x - last.x, to.y - last.y)?;
                *last = last.translate(dx, dy);
                Ok(EditOutcome::RectChanged(*rect))
            }
            DragContext::ResizingBox { rect, corner } => {
                rects.resize_from_corner(*rect, *corner, to.x, to.y)?;
                // Crossing the opposite corner flips which corner is held
                if let Some(resized) = rects.get(*rect) {
                    *corner = resized.nearest_corner(to.x, to.y);
                }
                Ok(EditOutcome::RectChanged(*rect))
            }
        }
    }

    /// Finish the gesture. The drag context is cleared whatever the result.
    pub fn release(
        &mut self,
        at: Point,
        rects: &mut RectangleSet,
        rows: &mut RowSet,
        config: &RowConfig,
    ) -> Result<EditOutcome> {
        match self.context {
            None => Ok(EditOutcome::Unchanged),
            Some(DragContext::DrawingLine { anchor, .. }) => {
                self.context = None;
                let id = rows.add_line(anchor, at, LineOrigin::Manual, config.min_line_length)?;
                if let Some(previous) = self.pending.replace(id) {
                    if rows.get(previous).is_some_and(|l| !l.is_locked()) {
                        rows.remove(previous);
                        debug!("Replaced unfinalized line {} with {}", previous, id);
                    }
                }
                Ok(EditOutcome::LineAdded(id))
            }
            Some(DragContext::DrawingBox { anchor, .. }) => {
                self.context = None;
                let rect = Rectangle::new(anchor.x, anchor.y, at.x, at.y)?;
                Ok(EditOutcome::RectAdded(rects.insert(rect)))
            }
            Some(_) => {
                let result = self.drag(at, rects, rows, config);
                self.context = None;
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    struct Fixture {
        editor: Editor,
        rects: RectangleSet,
        rows: RowSet,
        config: RowConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                editor: Editor::new(),
                rects: RectangleSet::new(),
                rows: RowSet::new(),
                config: RowConfig::default(),
            }
        }

        fn mode(&mut self, mode: EditMode) {
            self.editor.set_mode(mode, &mut self.rows);
        }

        fn press(&mut self, x: f64, y: f64) -> Result<EditOutcome> {
            self.editor.press(p(x, y), &mut self.rects, &mut self.rows, &self.config)
        }

        fn drag(&mut self, x: f64, y: f64) -> Result<EditOutcome> {
            self.editor.drag(p(x, y), &mut self.rects, &mut self.rows, &self.config)
        }

        fn release(&mut self, x: f64, y: f64) -> Result<EditOutcome> {
            self.editor.release(p(x, y), &mut self.rects, &mut self.rows, &self.config)
        }

        fn draw_locked(&mut self, a: Point, b: Point) -> LineId {
            self.mode(EditMode::AddLine);
            self.press(a.x, a.y).unwrap();
            self.release(b.x, b.y).unwrap();
            self.editor.finalize(&mut self.rows).unwrap()
        }
    }

    #[test]
    fn test_add_line_then_finalize() {
        let mut f = Fixture::new();
        f.mode(EditMode::AddLine);
        assert_eq!(f.press(0.0, 50.0).unwrap(), EditOutcome::Preview);
        f.drag(100.0, 52.0).unwrap();
        assert_eq!(f.editor.provisional_segment(), Some((p(0.0, 50.0), p(100.0, 52.0))));

        let EditOutcome::LineAdded(id) = f.release(200.0, 55.0).unwrap() else {
            panic!("expected a new line");
        };
        assert!(f.editor.drag_context().is_none());
        assert!(!f.rows.get(id).unwrap().is_locked());
        assert_eq!(f.editor.pending_line(), Some(id));

        assert_eq!(f.editor.finalize(&mut f.rows).unwrap(), id);
        assert!(f.rows.get(id).unwrap().is_locked());
        assert_eq!(f.editor.pending_line(), None);
    }

    #[test]
    fn test_short_line_is_rejected() {
        let mut f = Fixture::new();
        f.mode(EditMode::AddLine);
        f.press(10.0, 10.0).unwrap();
        assert!(matches!(f.release(14.0, 12.0), Err(OtolithError::InvalidGeometry(_))));
        assert!(f.rows.is_empty());
        assert!(f.editor.drag_context().is_none());
    }

    #[test]
    fn test_new_line_crossing_locked_is_rejected() {
        let mut f = Fixture::new();
        f.draw_locked(p(0.0, 100.0), p(300.0, 100.0));
        f.press(50.0, 50.0).unwrap();
        assert!(matches!(f.release(250.0, 150.0), Err(OtolithError::ForbiddenCrossing { .. })));
        assert_eq!(f.rows.len(), 1);
    }

    #[test]
    fn test_endpoint_drag_snaps_back_at_locked_line() {
        let mut f = Fixture::new();
        f.draw_locked(p(0.0, 100.0), p(300.0, 100.0));
        let line = f.rows.add_line(p(0.0, 50.0), p(300.0, 50.0), LineOrigin::Automatic, 10.0).unwrap();

        f.mode(EditMode::EditLine);
        f.press(295.0, 60.0).unwrap();
        assert_eq!(
            f.editor.drag_context(),
            Some(&DragContext::DraggingEndpoint { line, endpoint: Endpoint::End })
        );
        assert_eq!(f.drag(300.0, 80.0).unwrap(), EditOutcome::LineChanged(line));
        assert!(matches!(f.drag(300.0, 130.0), Err(OtolithError::ForbiddenCrossing { .. })));
        assert_eq!(f.rows.get(line).unwrap().p2(), p(300.0, 80.0));
        // still dragging after the rejected frame
        assert_eq!(f.drag(300.0, 90.0).unwrap(), EditOutcome::LineChanged(line));
        assert!(f.release(300.0, 140.0).is_err());
        assert_eq!(f.rows.get(line).unwrap().p2(), p(300.0, 90.0));
        assert!(f.editor.drag_context().is_none());
        assert!(!f.rows.has_locked_crossing());
    }

    #[test]
    fn test_body_drag_translates_both_endpoints() {
        let mut f = Fixture::new();
        let line = f.rows.add_line(p(0.0, 50.0), p(300.0, 50.0), LineOrigin::Automatic, 10.0).unwrap();
        f.mode(EditMode::EditLine);
        f.press(150.0, 60.0).unwrap();
        assert!(matches!(f.editor.drag_context(), Some(DragContext::DraggingLine { .. })));
        f.drag(160.0, 70.0).unwrap();
        f.release(170.0, 75.0).unwrap();
        let moved = f.rows.get(line).unwrap();
        assert_eq!((moved.p1(), moved.p2()), (p(20.0, 65.0), p(320.0, 65.0)));
    }

    #[test]
    fn test_locked_lines_are_not_editable() {
        let mut f = Fixture::new();
        f.draw_locked(p(0.0, 100.0), p(300.0, 100.0));
        f.mode(EditMode::EditLine);
        f.press(150.0, 105.0).unwrap();
        assert!(f.editor.drag_context().is_none());
    }

    #[test]
    fn test_delete_prefers_lines_then_rectangles() {
        let mut f = Fixture::new();
        let rect = f.rects.insert(Rectangle::new(100.0, 30.0, 140.0, 70.0).unwrap());
        let line = f.rows.add_line(p(0.0, 50.0), p(300.0, 50.0), LineOrigin::Automatic, 10.0).unwrap();
        f.rows.set_members(line, vec![rect]).unwrap();

        f.mode(EditMode::Delete);
        assert_eq!(f.press(120.0, 52.0).unwrap(), EditOutcome::LineRemoved(line));
        assert_eq!(f.rects.len(), 1);
        assert_eq!(f.rows.row_of(rect), None);

        assert_eq!(f.press(120.0, 52.0).unwrap(), EditOutcome::RectRemoved(rect));
        assert!(f.rects.is_empty());
        assert_eq!(f.press(120.0, 52.0).unwrap(), EditOutcome::Unchanged);
    }

    #[test]
    fn test_mode_switch_discards_pending_line_only() {
        let mut f = Fixture::new();
        let locked = f.draw_locked(p(0.0, 100.0), p(300.0, 100.0));
        f.press(0.0, 50.0).unwrap();
        let EditOutcome::LineAdded(pending) = f.release(300.0, 50.0).unwrap() else {
            panic!("expected a new line");
        };
        f.press(0.0, 20.0).unwrap();
        assert_eq!(f.editor.set_mode(EditMode::EditLine, &mut f.rows), Some(pending));
        assert!(f.editor.drag_context().is_none());
        assert!(f.rows.get(pending).is_none());
        assert!(f.rows.get(locked).is_some());
    }

    #[test]
    fn test_draw_and_edit_box() {
        let mut f = Fixture::new();
        f.mode(EditMode::AddBox);
        f.press(50.0, 50.0).unwrap();
        f.drag(80.0, 90.0).unwrap();
        assert_eq!(f.editor.provisional_box(), Some((p(50.0, 50.0), p(80.0, 90.0))));
        let EditOutcome::RectAdded(id) = f.release(10.0, 20.0).unwrap() else {
            panic!("expected a new rectangle");
        };
        assert_eq!(f.rects.get(id).unwrap().coordinates(), (10.0, 20.0, 50.0, 50.0));

        f.press(30.0, 30.0).unwrap();
        assert!(matches!(f.release(30.0, 30.0), Err(OtolithError::InvalidGeometry(_))));
        assert_eq!(f.rects.len(), 1);

        f.mode(EditMode::EditBox);
        // move from inside
        f.press(30.0, 35.0).unwrap();
        assert!(f.rects.get(id).unwrap().selected);
        f.release(40.0, 45.0).unwrap();
        assert_eq!(f.rects.get(id).unwrap().coordinates(), (20.0, 30.0, 60.0, 60.0));

        // resize from the bottom-right corner, dragging past the top-left one
        f.press(59.0, 59.0).unwrap();
        assert_eq!(
            f.editor.drag_context(),
            Some(&DragContext::ResizingBox { rect: id, corner: Corner::BottomRight })
        );
        f.drag(10.0, 15.0).unwrap();
        assert_eq!(f.rects.get(id).unwrap().coordinates(), (10.0, 15.0, 20.0, 30.0));
        f.release(5.0, 10.0).unwrap();
        assert_eq!(f.rects.get(id).unwrap().coordinates(), (5.0, 10.0, 20.0, 30.0));
    }
}
