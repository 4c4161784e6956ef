//! Axis-aligned specimen rectangles and the per-image set that owns them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{OtolithError, Result};
use crate::types::{Corner, Point};

static NEXT_RECT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable, process-unique rectangle identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RectId(pub u64);

impl RectId {
    fn next() -> Self {
        Self(NEXT_RECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A candidate specimen region in preview coordinates.
///
/// Coordinates are always normalized (`x1 < x2`, `y1 < y2`) and non-negative;
/// every constructor and mutator that could break this returns
/// [`OtolithError::InvalidGeometry`] and leaves the rectangle untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rectangle {
    id: RectId,
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    pub label: Option<String>,
    pub confidence: Option<f32>,
    pub selected: bool,
    /// Display-only, ignored by the engine
    pub color: Option<[u8; 3]>,
}

fn normalize(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<[f64; 4]> {
    if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
        return Err(OtolithError::InvalidGeometry(format!(
            "non-finite rectangle coordinates ({x1}, {y1}, {x2}, {y2})"
        )));
    }
    let (x1, x2) = (x1.min(x2), x1.max(x2));
    let (y1, y2) = (y1.min(y2), y1.max(y2));
    if x1 == x2 || y1 == y2 {
        return Err(OtolithError::InvalidGeometry(format!(
            "rectangle ({x1}, {y1}, {x2}, {y2}) has zero width or height"
        )));
    }
    if x1 < 0.0 || y1 < 0.0 {
        return Err(OtolithError::InvalidGeometry(format!(
            "rectangle ({x1}, {y1}, {x2}, {y2}) has negative coordinates"
        )));
    }
    Ok([x1, y1, x2, y2])
}

impl Rectangle {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self> {
        let [x1, y1, x2, y2] = normalize(x1, y1, x2, y2)?;
        Ok(Self {
            id: RectId::next(),
            x1,
            y1,
            x2,
            y2,
            label: None,
            confidence: None,
            selected: false,
            color: None,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn id(&self) -> RectId {
        self.id
    }

    pub fn x1(&self) -> f64 {
        self.x1
    }

    pub fn y1(&self) -> f64 {
        self.y1
    }

    pub fn x2(&self) -> f64 {
        self.x2
    }

    pub fn y2(&self) -> f64 {
        self.y2
    }

    /// Coordinates as `(x1, y1, x2, y2)`
    pub fn coordinates(&self) -> (f64, f64, f64, f64) {
        (self.x1, self.y1, self.x2, self.y2)
    }

    /// Replace the coordinates, normalizing corner order
    pub fn update(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) -> Result<()> {
        let [x1, y1, x2, y2] = normalize(x1, y1, x2, y2)?;
        self.x1 = x1;
        self.y1 = y1;
        self.x2 = x2;
        self.y2 = y2;
        Ok(())
    }

    /// Translate by `(dx, dy)`, limiting the delta so the rectangle never
    /// leaves the non-negative quadrant. Returns the delta actually applied.
    pub fn translate(&mut self, dx: f64, dy: f64) -> (f64, f64) {
        let dx = dx.max(-self.x1);
        let dy = dy.max(-self.y1);
        self.x1 += dx;
        self.x2 += dx;
        self.y1 += dy;
        self.y2 += dy;
        (dx, dy)
    }

    pub fn corner(&self, corner: Corner) -> Point {
        match corner {
            Corner::TopLeft => Point::new(self.x1, self.y1),
            Corner::TopRight => Point::new(self.x2, self.y1),
            Corner::BottomRight => Point::new(self.x2, self.y2),
            Corner::BottomLeft => Point::new(self.x1, self.y2),
        }
    }

    /// Drag `corner` to `(x, y)` keeping the opposite corner fixed.
    /// Dragging past the opposite corner flips the box instead of inverting it.
    pub fn resize_from_corner(&mut self, corner: Corner, x: f64, y: f64) -> Result<()> {
        let anchor = self.corner(corner.opposite());
        self.update(anchor.x, anchor.y, x, y)
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width() / self.height()
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Euclidean nearest corner; ties resolve to the lowest corner index
    pub fn nearest_corner(&self, x: f64, y: f64) -> Corner {
        let target = Point::new(x, y);
        let mut best = Corner::TopLeft;
        let mut best_distance = f64::INFINITY;
        for corner in Corner::ALL {
            let distance = self.corner(corner).distance_to(target);
            if distance < best_distance {
                best = corner;
                best_distance = distance;
            }
        }
        best
    }

    /// Separating-axis test; boxes that only touch along an edge intersect
    pub fn intersects(&self, other: &Rectangle) -> bool {
        !(self.x2 < other.x1 || other.x2 < self.x1 || self.y2 < other.y1 || other.y2 < self.y1)
    }

    pub fn intersection_area(&self, other: &Rectangle) -> f64 {
        let width = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let height = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        width * height
    }

    /// Intersection over union, `0.0` for disjoint boxes
    pub fn iou(&self, other: &Rectangle) -> f64 {
        let intersection = self.intersection_area(other);
        if intersection <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }

    pub fn contains_point(&self, x: f64, y: f64, tolerance: f64) -> bool {
        self.x1 - tolerance <= x
            && x <= self.x2 + tolerance
            && self.y1 - tolerance <= y
            && y <= self.y2 + tolerance
    }

    /// Convert to geo-types Rect for geometric predicates
    pub fn to_geo_rect(&self) -> geo_types::Rect<f64> {
        geo_types::Rect::new(
            geo_types::Coord { x: self.x1, y: self.y1 },
            geo_types::Coord { x: self.x2, y: self.y2 },
        )
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rectangle {} ({:.1}, {:.1}, {:.1}, {:.1})",
            self.id, self.x1, self.y1, self.x2, self.y2
        )?;
        if let Some(label) = &self.label {
            write!(f, " label={label}")?;
        }
        Ok(())
    }
}

/// The rectangles of the currently loaded image, in insertion order
#[derive(Debug, Clone, Default, Serialize)]
pub struct RectangleSet {
    rects: Vec<Rectangle>,
}

impl RectangleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rects(rects: Vec<Rectangle>) -> Self {
        Self { rects }
    }

    pub fn insert(&mut self, rect: Rectangle) -> RectId {
        let id = rect.id();
        self.rects.push(rect);
        id
    }

    pub fn get(&self, id: RectId) -> Option<&Rectangle> {
        self.rects.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: RectId) -> Option<&mut Rectangle> {
        self.rects.iter_mut().find(|r| r.id == id)
    }

    pub fn contains(&self, id: RectId) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: RectId) -> Option<Rectangle> {
        let index = self.rects.iter().position(|r| r.id == id)?;
        Some(self.rects.remove(index))
    }

    pub fn update(&mut self, id: RectId, x1: f64, y1: f64, x2: f64, y2: f64) -> Result<()> {
        self.get_mut(id)
            .ok_or(OtolithError::UnknownRectangle(id))?
            .update(x1, y1, x2, y2)
    }

    /// Move a rectangle; see [`Rectangle::translate`]
    pub fn translate(&mut self, id: RectId, dx: f64, dy: f64) -> Result<(f64, f64)> {
        let rect = self.get_mut(id).ok_or(OtolithError::UnknownRectangle(id))?;
        Ok(rect.translate(dx, dy))
    }

    pub fn resize_from_corner(&mut self, id: RectId, corner: Corner, x: f64, y: f64) -> Result<()> {
        self.get_mut(id)
            .ok_or(OtolithError::UnknownRectangle(id))?
            .resize_from_corner(corner, x, y)
    }

    /// Topmost (most recently inserted) rectangle containing the point
    pub fn hit_test(&self, x: f64, y: f64, tolerance: f64) -> Option<RectId> {
        self.rects
            .iter()
            .rev()
            .find(|r| r.contains_point(x, y, tolerance))
            .map(Rectangle::id)
    }

    /// Topmost rectangle with a corner within `tolerance` of the point
    pub fn corner_hit(&self, x: f64, y: f64, tolerance: f64) -> Option<(RectId, Corner)> {
        let target = Point::new(x, y);
        self.rects.iter().rev().find_map(|r| {
            let corner = r.nearest_corner(x, y);
            (r.corner(corner).distance_to(target) <= tolerance).then_some((r.id, corner))
        })
    }

    pub fn select(&mut self, id: RectId) -> Result<()> {
        if !self.contains(id) {
            return Err(OtolithError::UnknownRectangle(id));
        }
        for rect in &mut self.rects {
            rect.selected = rect.id == id;
        }
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        for rect in &mut self.rects {
            rect.selected = false;
        }
    }

    /// Mean `(width, height)`, `None` for an empty set
    pub fn mean_size(&self) -> Option<(f64, f64)> {
        mean_size(self.rects.iter())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rectangle> {
        self.rects.iter()
    }

    pub fn ids(&self) -> Vec<RectId> {
        self.rects.iter().map(Rectangle::id).collect()
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }
}

impl<'a> IntoIterator for &'a RectangleSet {
    type Item = &'a Rectangle;
    type IntoIter = std::slice::Iter<'a, Rectangle>;

    fn into_iter(self) -> Self::IntoIter {
        self.rects.iter()
    }
}

pub(crate) fn mean_size<'a>(rects: impl Iterator<Item = &'a Rectangle>) -> Option<(f64, f64)> {
    let (count, width, height) = rects.fold((0usize, 0.0, 0.0), |(n, w, h), r| {
        (n + 1, w + r.width(), h + r.height())
    });
    (count > 0).then(|| (width / count as f64, height / count as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_corners() {
        let rect = Rectangle::new(50.0, 60.0, 10.0, 20.0).unwrap();
        assert_eq!(rect.coordinates(), (10.0, 20.0, 50.0, 60.0));
        assert_eq!(rect.width(), 40.0);
        assert_eq!(rect.height(), 40.0);
        assert_eq!(rect.area(), 1600.0);
        assert_eq!(rect.center(), Point::new(30.0, 40.0));
    }

    #[test]
    fn test_rejects_degenerate_and_negative() {
        assert!(matches!(
            Rectangle::new(10.0, 10.0, 10.0, 20.0),
            Err(OtolithError::InvalidGeometry(_))
        ));
        assert!(Rectangle::new(10.0, 10.0, 20.0, 10.0).is_err());
        assert!(Rectangle::new(-1.0, 0.0, 20.0, 10.0).is_err());
        assert!(Rectangle::new(0.0, 0.0, f64::NAN, 10.0).is_err());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Rectangle::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let b = Rectangle::new(0.0, 0.0, 1.0, 1.0).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(a.id() < b.id());
    }

    #[test]
    fn test_move_then_inverse_restores() {
        let mut rect = Rectangle::new(12.5, 40.25, 80.0, 96.75).unwrap();
        let before = rect.coordinates();
        for (dx, dy) in [(3.0, -7.5), (-12.5, 0.25), (1024.0, 2048.0)] {
            rect.translate(dx, dy);
            rect.translate(-dx, -dy);
            assert_eq!(rect.coordinates(), before);
        }
    }

    #[test]
    fn test_move_past_origin_is_clamped() {
        let mut rect = Rectangle::new(30.0, 8.0, 50.0, 20.0).unwrap();
        assert_eq!(rect.translate(-100.0, -3.0), (-30.0, -3.0));
        assert_eq!(rect.coordinates(), (0.0, 5.0, 20.0, 17.0));
        assert_eq!(rect.translate(4.0, -50.0), (4.0, -5.0));
        assert_eq!(rect.coordinates(), (4.0, 0.0, 24.0, 12.0));
    }

    #[test]
    fn test_failed_update_keeps_state() {
        let mut rect = Rectangle::new(10.0, 10.0, 20.0, 20.0).unwrap();
        assert!(rect.update(5.0, 5.0, 5.0, 30.0).is_err());
        assert_eq!(rect.coordinates(), (10.0, 10.0, 20.0, 20.0));
    }

    #[test]
    fn test_resize_from_corner_renormalizes() {
        let mut rect = Rectangle::new(10.0, 10.0, 20.0, 20.0).unwrap();
        rect.resize_from_corner(Corner::BottomRight, 30.0, 40.0).unwrap();
        assert_eq!(rect.coordinates(), (10.0, 10.0, 30.0, 40.0));

        // Drag the top-left corner past the bottom-right one
        rect.resize_from_corner(Corner::TopLeft, 50.0, 60.0).unwrap();
        assert_eq!(rect.coordinates(), (30.0, 40.0, 50.0, 60.0));

        assert!(rect.resize_from_corner(Corner::TopRight, 30.0, 0.0).is_err());
        assert_eq!(rect.coordinates(), (30.0, 40.0, 50.0, 60.0));
    }

    #[test]
    fn test_nearest_corner() {
        let rect = Rectangle::new(0.0, 0.0, 100.0, 50.0).unwrap();
        assert_eq!(rect.nearest_corner(-5.0, -5.0), Corner::TopLeft);
        assert_eq!(rect.nearest_corner(90.0, 3.0), Corner::TopRight);
        assert_eq!(rect.nearest_corner(99.0, 49.0), Corner::BottomRight);
        assert_eq!(rect.nearest_corner(2.0, 45.0), Corner::BottomLeft);
    }

    #[test]
    fn test_intersects_and_iou() {
        let a = Rectangle::new(0.0, 0.0, 10.0, 10.0).unwrap();
        let b = Rectangle::new(5.0, 5.0, 15.0, 15.0).unwrap();
        let c = Rectangle::new(20.0, 0.0, 30.0, 10.0).unwrap();
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.intersection_area(&b), 25.0);
        assert!((a.iou(&b) - 25.0 / 175.0).abs() < 1e-9);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn test_contains_point_with_tolerance() {
        let rect = Rectangle::new(10.0, 10.0, 20.0, 20.0).unwrap();
        assert!(rect.contains_point(15.0, 15.0, 0.0));
        assert!(!rect.contains_point(22.0, 15.0, 0.0));
        assert!(rect.contains_point(22.0, 15.0, 3.0));
    }

    #[test]
    fn test_set_hit_test_prefers_topmost() {
        let mut set = RectangleSet::new();
        let lower = set.insert(Rectangle::new(0.0, 0.0, 50.0, 50.0).unwrap());
        let upper = set.insert(Rectangle::new(25.0, 25.0, 75.0, 75.0).unwrap());
        assert_eq!(set.hit_test(30.0, 30.0, 0.0), Some(upper));
        assert_eq!(set.hit_test(10.0, 10.0, 0.0), Some(lower));
        assert_eq!(set.hit_test(100.0, 100.0, 0.0), None);
        assert_eq!(set.corner_hit(76.0, 74.0, 3.0), Some((upper, Corner::BottomRight)));
    }

    #[test]
    fn test_set_translate_stays_non_negative() {
        let mut set = RectangleSet::new();
        let id = set.insert(Rectangle::new(5.0, 5.0, 15.0, 15.0).unwrap());
        let applied = set.translate(id, -10.0, 2.0).unwrap();
        assert_eq!(applied, (-5.0, 2.0));
        assert_eq!(set.get(id).unwrap().coordinates(), (0.0, 7.0, 10.0, 17.0));
    }

    #[test]
    fn test_set_selection_and_removal() {
        let mut set = RectangleSet::new();
        let a = set.insert(Rectangle::new(0.0, 0.0, 10.0, 10.0).unwrap());
        let b = set.insert(Rectangle::new(20.0, 0.0, 40.0, 30.0).unwrap());
        set.select(b).unwrap();
        assert!(set.get(b).unwrap().selected);
        assert!(!set.get(a).unwrap().selected);
        assert_eq!(set.mean_size(), Some((15.0, 20.0)));

        assert!(set.remove(a).is_some());
        assert!(set.remove(a).is_none());
        assert!(matches!(set.select(a), Err(OtolithError::UnknownRectangle(_))));
        assert_eq!(set.len(), 1);
    }
}
