use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use super::line::{Endpoint, LineId, LineOrigin, RowLine};
use super::segment::crosses_sweep;
use crate::error::{OtolithError, Result};
use crate::rect::{RectId, Rectangle, RectangleSet};
use crate::types::Point;

/// What happens to rectangles no segment passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrphanPolicy {
    /// Leave them unclaimed
    #[default]
    Leave,
    /// Give them to the nearest unlocked line
    NearestUnlocked,
}

/// The row lines of the currently loaded image, in creation order.
///
/// No two locked lines ever cross: every operation that could introduce a
/// crossing checks the proposed segment against the locked subset first and
/// fails with [`OtolithError::ForbiddenCrossing`] without changing anything.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RowSet {
    lines: Vec<RowLine>,
}

impl RowSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: LineId) -> Option<&RowLine> {
        self.lines.iter().find(|l| l.id() == id)
    }

    fn get_mut(&mut self, id: LineId) -> Result<&mut RowLine> {
        self.lines
            .iter_mut()
            .find(|l| l.id() == id)
            .ok_or(OtolithError::UnknownLine(id))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RowLine> {
        self.lines.iter()
    }

    pub fn locked(&self) -> impl Iterator<Item = &RowLine> {
        self.lines.iter().filter(|l| l.is_locked())
    }

    pub fn unlocked(&self) -> impl Iterator<Item = &RowLine> {
        self.lines.iter().filter(|l| !l.is_locked())
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Reject segments that are too short or would cross a locked line
    /// other than `ignore`.
    pub fn check_segment(&self, p1: Point, p2: Point, ignore: Option<LineId>, min_length: f64) -> Result<()> {
        let length = p1.distance_to(p2);
        if length < min_length {
            return Err(OtolithError::InvalidGeometry(format!(
                "line length {length:.1} is below the minimum {min_length:.1}"
            )));
        }
        self.check_crossing(p1, p2, ignore)
    }

    fn check_crossing(&self, p1: Point, p2: Point, ignore: Option<LineId>) -> Result<()> {
        match self
            .locked()
            .find(|l| Some(l.id()) != ignore && l.crosses_segment(p1, p2))
        {
            Some(locked) => Err(OtolithError::ForbiddenCrossing { locked: locked.id() }),
            None => Ok(()),
        }
    }

    /// Add an unlocked line with no members
    pub fn add_line(&mut self, p1: Point, p2: Point, origin: LineOrigin, min_length: f64) -> Result<LineId> {
        self.check_segment(p1, p2, None, min_length)?;
        let line = RowLine::new(p1, p2, origin);
        let id = line.id();
        debug!("Added {} line {} ({:?} -> {:?})", origin, id, p1, p2);
        self.lines.push(line);
        Ok(id)
    }

    pub(crate) fn set_members(&mut self, id: LineId, members: Vec<RectId>) -> Result<()> {
        self.get_mut(id)?.members = members;
        Ok(())
    }

    /// Finalize a line. Fails if it now crosses another locked line.
    pub fn lock(&mut self, id: LineId) -> Result<()> {
        let line = self.get(id).ok_or(OtolithError::UnknownLine(id))?;
        if line.is_locked() {
            return Ok(());
        }
        self.check_crossing(line.p1(), line.p2(), Some(id))?;
        self.get_mut(id)?.lock();
        debug!("Locked line {}", id);
        Ok(())
    }

    /// Replace both endpoints of an unlocked line.
    ///
    /// Besides the final segment, the whole region the line sweeps on its
    /// way there is checked, so a single large step cannot jump a line over
    /// a locked one.
    pub fn set_endpoints(&mut self, id: LineId, p1: Point, p2: Point, min_length: f64) -> Result<()> {
        let line = self.get(id).ok_or(OtolithError::UnknownLine(id))?;
        if line.is_locked() {
            return Err(OtolithError::LineLocked(id));
        }
        let from = (line.p1(), line.p2());
        self.check_segment(p1, p2, Some(id), min_length)?;
        if let Some(locked) = self
            .locked()
            .find(|l| crosses_sweep(l.p1(), l.p2(), from, (p1, p2)))
        {
            return Err(OtolithError::ForbiddenCrossing { locked: locked.id() });
        }
        self.get_mut(id)?.set_endpoints(p1, p2);
        Ok(())
    }

    pub fn move_endpoint(&mut self, id: LineId, endpoint: Endpoint, to: Point, min_length: f64) -> Result<()> {
        let line = self.get(id).ok_or(OtolithError::UnknownLine(id))?;
        let (p1, p2) = match endpoint {
            Endpoint::Start => (to, line.p2()),
            Endpoint::End => (line.p1(), to),
        };
        self.set_endpoints(id, p1, p2, min_length)
    }

    pub fn translate(&mut self, id: LineId, dx: f64, dy: f64, min_length: f64) -> Result<()> {
        let line = self.get(id).ok_or(OtolithError::UnknownLine(id))?;
        let (p1, p2) = (line.p1().translate(dx, dy), line.p2().translate(dx, dy));
        self.set_endpoints(id, p1, p2, min_length)
    }

    /// Delete a line; its rectangles become unclaimed
    pub fn remove(&mut self, id: LineId) -> Option<RowLine> {
        let index = self.lines.iter().position(|l| l.id() == id)?;
        Some(self.lines.remove(index))
    }

    pub fn remove_unlocked(&mut self) -> usize {
        let before = self.lines.len();
        self.lines.retain(RowLine::is_locked);
        before - self.lines.len()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Drop a rectangle from whichever line claims it
    pub fn release(&mut self, rect: RectId) {
        for line in &mut self.lines {
            line.members.retain(|&m| m != rect);
        }
    }

    pub fn row_of(&self, rect: RectId) -> Option<LineId> {
        self.lines
            .iter()
            .find(|l| l.members.contains(&rect))
            .map(RowLine::id)
    }

    pub fn claimed(&self) -> impl Iterator<Item = RectId> + '_ {
        self.lines.iter().flat_map(|l| l.members.iter().copied())
    }

    /// The best line for `rect` among `candidates`: smallest row distance
    /// at the rectangle's centre, the earlier line on exact ties.
    fn best_line<'a>(candidates: impl Iterator<Item = &'a RowLine>, rect: &Rectangle) -> Option<LineId> {
        let center = rect.center();
        let mut best: Option<(LineId, f64)> = None;
        for line in candidates {
            let distance = line.row_distance(center);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((line.id(), distance));
            }
        }
        best.map(|(id, _)| id)
    }

    pub fn nearest_unlocked(&self, rect: &Rectangle) -> Option<LineId> {
        Self::best_line(self.unlocked(), rect)
    }

    /// Clear all membership and rebuild it from the current geometry.
    ///
    /// Each rectangle goes to the line whose segment passes through it; with
    /// [`OrphanPolicy::NearestUnlocked`] the rest go to the nearest unlocked
    /// line. Members are kept in left-to-right order. The result depends only
    /// on the geometry, so recomputing twice gives identical lists.
    pub fn recompute_membership(&mut self, rects: &RectangleSet, policy: OrphanPolicy) {
        for line in &mut self.lines {
            line.members.clear();
        }

        let mut orphans = 0usize;
        for rect in rects {
            let owner = Self::best_line(self.lines.iter().filter(|l| l.intersects_rect(rect)), rect)
                .or_else(|| match policy {
                    OrphanPolicy::Leave => None,
                    OrphanPolicy::NearestUnlocked => self.nearest_unlocked(rect),
                });
            match owner.and_then(|id| self.lines.iter_mut().find(|l| l.id() == id)) {
                Some(line) => line.members.push(rect.id()),
                None => orphans += 1,
            }
        }

        self.sort_members(rects);
        debug!(
            "Recomputed membership of {} lines, {} rectangles unclaimed",
            self.lines.len(),
            orphans
        );
    }

    fn sort_members(&mut self, rects: &RectangleSet) {
        let center_x = |id: &RectId| rects.get(*id).map_or(f64::INFINITY, |r| r.center().x);
        for line in &mut self.lines {
            line.members
                .sort_by(|a, b| center_x(a).total_cmp(&center_x(b)));
        }
    }

    /// Nearest line whose segment lies within `tolerance` of `point`.
    /// Locked lines are only considered when `include_locked` is set.
    pub fn pick_line(&self, point: Point, tolerance: f64, include_locked: bool) -> Option<LineId> {
        let mut best: Option<(LineId, f64)> = None;
        for line in self.lines.iter().filter(|l| include_locked || !l.is_locked()) {
            let distance = line.distance_to_point(point);
            if distance <= tolerance && best.map_or(true, |(_, d)| distance < d) {
                best = Some((line.id(), distance));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Nearest unlocked endpoint within `tolerance` of `point`
    pub fn pick_endpoint(&self, point: Point, tolerance: f64) -> Option<(LineId, Endpoint)> {
        let mut best: Option<(LineId, Endpoint, f64)> = None;
        for line in self.unlocked() {
            let (endpoint, distance) = line.nearest_endpoint(point);
            if distance <= tolerance && best.map_or(true, |(_, _, d)| distance < d) {
                best = Some((line.id(), endpoint, distance));
            }
        }
        best.map(|(id, endpoint, _)| (id, endpoint))
    }

    /// Whether any two locked lines cross
    pub fn has_locked_crossing(&self) -> bool {
        let locked: Vec<&RowLine> = self.locked().collect();
        locked
            .iter()
            .enumerate()
            .any(|(i, a)| locked[i + 1..].iter().any(|b| a.crosses(b)))
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a RowLine;
    type IntoIter = std::slice::Iter<'a, RowLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: f64 = 10.0;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn rects(coords: &[(f64, f64, f64, f64)]) -> RectangleSet {
        RectangleSet::from_rects(
            coords
                .iter()
                .map(|&(x1, y1, x2, y2)| Rectangle::new(x1, y1, x2, y2).unwrap())
                .collect(),
        )
    }

    #[test]
    fn test_add_line_rejects_short_segments() {
        let mut rows = RowSet::new();
        let err = rows.add_line(p(0.0, 0.0), p(5.0, 5.0), LineOrigin::Manual, MIN);
        assert!(matches!(err, Err(OtolithError::InvalidGeometry(_))));
        assert!(rows.is_empty());
    }

    #[test]
    fn test_new_line_cannot_cross_locked() {
        let mut rows = RowSet::new();
        let locked = rows.add_line(p(0.0, 50.0), p(200.0, 50.0), LineOrigin::Manual, MIN).unwrap();
        rows.lock(locked).unwrap();

        let err = rows.add_line(p(0.0, 0.0), p(200.0, 100.0), LineOrigin::Manual, MIN);
        assert!(matches!(err, Err(OtolithError::ForbiddenCrossing { locked: id }) if id == locked));
        assert_eq!(rows.len(), 1);

        // Drawing end to end is allowed
        rows.add_line(p(200.0, 50.0), p(400.0, 60.0), LineOrigin::Manual, MIN).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_locking_two_crossing_lines_fails() {
        let mut rows = RowSet::new();
        let a = rows.add_line(p(0.0, 0.0), p(100.0, 100.0), LineOrigin::Manual, MIN).unwrap();
        let b = rows.add_line(p(0.0, 100.0), p(100.0, 0.0), LineOrigin::Manual, MIN).unwrap();
        rows.lock(a).unwrap();
        assert!(matches!(rows.lock(b), Err(OtolithError::ForbiddenCrossing { .. })));
        assert!(!rows.get(b).unwrap().is_locked());
        assert!(!rows.has_locked_crossing());
    }

    #[test]
    fn test_endpoint_drag_into_crossing_is_rejected() {
        let mut rows = RowSet::new();
        let locked = rows.add_line(p(0.0, 100.0), p(300.0, 100.0), LineOrigin::Manual, MIN).unwrap();
        rows.lock(locked).unwrap();
        let line = rows.add_line(p(0.0, 50.0), p(300.0, 50.0), LineOrigin::Manual, MIN).unwrap();

        let err = rows.move_endpoint(line, Endpoint::End, p(300.0, 150.0), MIN);
        assert!(matches!(err, Err(OtolithError::ForbiddenCrossing { .. })));
        let stored = rows.get(line).unwrap();
        assert_eq!((stored.p1(), stored.p2()), (p(0.0, 50.0), p(300.0, 50.0)));

        rows.move_endpoint(line, Endpoint::End, p(300.0, 80.0), MIN).unwrap();
        assert_eq!(rows.get(line).unwrap().p2(), p(300.0, 80.0));
    }

    #[test]
    fn test_translation_cannot_jump_over_locked_line() {
        let mut rows = RowSet::new();
        let locked = rows.add_line(p(0.0, 100.0), p(300.0, 100.0), LineOrigin::Manual, MIN).unwrap();
        rows.lock(locked).unwrap();
        let line = rows.add_line(p(50.0, 50.0), p(250.0, 50.0), LineOrigin::Manual, MIN).unwrap();

        // The final position alone would not cross; the path does
        let err = rows.translate(line, 0.0, 100.0, MIN);
        assert!(matches!(err, Err(OtolithError::ForbiddenCrossing { .. })));
        assert_eq!(rows.get(line).unwrap().p1(), p(50.0, 50.0));
    }

    #[test]
    fn test_body_drag_cannot_sweep_over_short_locked_line() {
        let mut rows = RowSet::new();
        let locked = rows.add_line(p(100.0, 100.0), p(150.0, 100.0), LineOrigin::Manual, MIN).unwrap();
        rows.lock(locked).unwrap();
        let line = rows.add_line(p(0.0, 50.0), p(300.0, 50.0), LineOrigin::Manual, MIN).unwrap();

        // both endpoint paths pass outside the locked segment
        let err = rows.translate(line, 0.0, 100.0, MIN);
        assert!(matches!(err, Err(OtolithError::ForbiddenCrossing { locked: id }) if id == locked));
        let stored = rows.get(line).unwrap();
        assert_eq!((stored.p1(), stored.p2()), (p(0.0, 50.0), p(300.0, 50.0)));

        // short of the locked segment is fine
        rows.translate(line, 0.0, 40.0, MIN).unwrap();
        assert_eq!(rows.get(line).unwrap().p1(), p(0.0, 90.0));
    }

    #[test]
    fn test_endpoint_drag_cannot_sweep_over_locked_line() {
        let mut rows = RowSet::new();
        let locked = rows.add_line(p(200.0, 80.0), p(220.0, 80.0), LineOrigin::Manual, MIN).unwrap();
        rows.lock(locked).unwrap();
        let line = rows.add_line(p(0.0, 50.0), p(300.0, 50.0), LineOrigin::Manual, MIN).unwrap();

        // the locked segment sits inside the triangle swept by the end
        let err = rows.move_endpoint(line, Endpoint::End, p(300.0, 150.0), MIN);
        assert!(matches!(err, Err(OtolithError::ForbiddenCrossing { .. })));
        assert_eq!(rows.get(line).unwrap().p2(), p(300.0, 50.0));
        assert!(!rows.has_locked_crossing());
    }

    #[test]
    fn test_moving_away_from_touching_locked_line() {
        let mut rows = RowSet::new();
        // ends on the unlocked line
        let locked = rows.add_line(p(150.0, 0.0), p(150.0, 50.0), LineOrigin::Manual, MIN).unwrap();
        rows.lock(locked).unwrap();
        let line = rows.add_line(p(0.0, 50.0), p(300.0, 50.0), LineOrigin::Manual, MIN).unwrap();

        rows.translate(line, 0.0, 30.0, MIN).unwrap();
        assert!(matches!(
            rows.translate(line, 0.0, -60.0, MIN),
            Err(OtolithError::ForbiddenCrossing { .. })
        ));
        assert_eq!(rows.get(line).unwrap().p1(), p(0.0, 80.0));
    }

    #[test]
    fn test_locked_line_is_immutable() {
        let mut rows = RowSet::new();
        let id = rows.add_line(p(0.0, 10.0), p(100.0, 10.0), LineOrigin::Manual, MIN).unwrap();
        rows.lock(id).unwrap();
        assert!(matches!(rows.translate(id, 0.0, 5.0, MIN), Err(OtolithError::LineLocked(_))));
        assert!(!rows.has_locked_crossing());
    }

    #[test]
    fn test_membership_by_segment_intersection() {
        let set = rects(&[
            (10.0, 40.0, 30.0, 60.0),
            (50.0, 42.0, 70.0, 62.0),
            (90.0, 140.0, 110.0, 160.0),
        ]);
        let ids = set.ids();
        let mut rows = RowSet::new();
        let line = rows.add_line(p(0.0, 50.0), p(120.0, 52.0), LineOrigin::Manual, MIN).unwrap();

        rows.recompute_membership(&set, OrphanPolicy::Leave);
        assert_eq!(rows.get(line).unwrap().members(), &ids[..2]);
        assert_eq!(rows.row_of(ids[2]), None);

        rows.recompute_membership(&set, OrphanPolicy::NearestUnlocked);
        assert_eq!(rows.get(line).unwrap().members(), &ids[..]);
    }

    #[test]
    fn test_membership_is_idempotent() {
        let set = rects(&[
            (10.0, 40.0, 30.0, 60.0),
            (50.0, 45.0, 70.0, 75.0),
            (40.0, 90.0, 60.0, 110.0),
        ]);
        let mut rows = RowSet::new();
        rows.add_line(p(0.0, 50.0), p(100.0, 55.0), LineOrigin::Manual, MIN).unwrap();
        rows.add_line(p(0.0, 70.0), p(100.0, 100.0), LineOrigin::Manual, MIN).unwrap();

        rows.recompute_membership(&set, OrphanPolicy::Leave);
        let first: Vec<Vec<RectId>> = rows.iter().map(|l| l.members().to_vec()).collect();
        rows.recompute_membership(&set, OrphanPolicy::Leave);
        let second: Vec<Vec<RectId>> = rows.iter().map(|l| l.members().to_vec()).collect();
        assert_eq!(first, second);
        // Each rectangle is claimed at most once
        let claimed: Vec<RectId> = rows.claimed().collect();
        let mut unique = claimed.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(claimed.len(), unique.len());
    }

    #[test]
    fn test_contested_rectangle_goes_to_closer_line() {
        let set = rects(&[(40.0, 40.0, 60.0, 80.0)]);
        let id = set.ids()[0];
        let mut rows = RowSet::new();
        let far = rows.add_line(p(0.0, 45.0), p(100.0, 45.0), LineOrigin::Manual, MIN).unwrap();
        let near = rows.add_line(p(0.0, 65.0), p(100.0, 65.0), LineOrigin::Manual, MIN).unwrap();
        rows.recompute_membership(&set, OrphanPolicy::Leave);
        assert_eq!(rows.row_of(id), Some(near));
        assert!(rows.get(far).unwrap().members().is_empty());
    }

    #[test]
    fn test_exact_tie_keeps_earlier_line() {
        let set = rects(&[(40.0, 40.0, 60.0, 80.0)]);
        let id = set.ids()[0];
        let mut rows = RowSet::new();
        let first = rows.add_line(p(0.0, 50.0), p(100.0, 50.0), LineOrigin::Manual, MIN).unwrap();
        rows.add_line(p(0.0, 70.0), p(100.0, 70.0), LineOrigin::Manual, MIN).unwrap();
        rows.recompute_membership(&set, OrphanPolicy::Leave);
        assert_eq!(rows.row_of(id), Some(first));
    }

    #[test]
    fn test_remove_releases_members() {
        let set = rects(&[(10.0, 40.0, 30.0, 60.0)]);
        let id = set.ids()[0];
        let mut rows = RowSet::new();
        let line = rows.add_line(p(0.0, 50.0), p(100.0, 50.0), LineOrigin::Manual, MIN).unwrap();
        rows.recompute_membership(&set, OrphanPolicy::Leave);
        assert_eq!(rows.row_of(id), Some(line));
        rows.remove(line);
        assert_eq!(rows.row_of(id), None);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_pick_line_and_endpoint() {
        let mut rows = RowSet::new();
        let a = rows.add_line(p(0.0, 50.0), p(200.0, 50.0), LineOrigin::Manual, MIN).unwrap();
        let b = rows.add_line(p(0.0, 150.0), p(200.0, 150.0), LineOrigin::Manual, MIN).unwrap();
        assert_eq!(rows.pick_line(p(100.0, 65.0), 20.0, false), Some(a));
        assert_eq!(rows.pick_line(p(100.0, 100.0), 20.0, false), None);
        assert_eq!(rows.pick_endpoint(p(190.0, 170.0), 30.0), Some((b, Endpoint::End)));

        rows.lock(a).unwrap();
        assert_eq!(rows.pick_line(p(100.0, 65.0), 20.0, false), None);
        assert_eq!(rows.pick_line(p(100.0, 65.0), 20.0, true), Some(a));
        assert_eq!(rows.pick_endpoint(p(5.0, 55.0), 30.0), None);
    }
}
