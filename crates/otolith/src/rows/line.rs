use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use super::segment::{point_segment_distance, segment_intersects_rect, segments_cross};
use crate::rect::{RectId, Rectangle};
use crate::types::Point;

static NEXT_LINE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable line identifier; a lower id means the line was created earlier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct LineId(pub u64);

impl LineId {
    fn next() -> Self {
        Self(NEXT_LINE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Display, EnumString, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Endpoint {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LineOrigin {
    /// Fitted by automatic clustering
    Automatic,
    /// Drawn by the user
    Manual,
}

/// A row boundary: the segment `p1 -> p2` plus the rectangles it claims.
///
/// Endpoints are only changed through [`super::RowSet`], which enforces the
/// locked-line invariants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowLine {
    id: LineId,
    p1: Point,
    p2: Point,
    pub(crate) members: Vec<RectId>,
    locked: bool,
    origin: LineOrigin,
}

impl RowLine {
    pub(crate) fn new(p1: Point, p2: Point, origin: LineOrigin) -> Self {
        Self {
            id: LineId::next(),
            p1,
            p2,
            members: Vec::new(),
            locked: false,
            origin,
        }
    }

    pub fn id(&self) -> LineId {
        self.id
    }

    pub fn p1(&self) -> Point {
        self.p1
    }

    pub fn p2(&self) -> Point {
        self.p2
    }

    pub fn endpoint(&self, endpoint: Endpoint) -> Point {
        match endpoint {
            Endpoint::Start => self.p1,
            Endpoint::End => self.p2,
        }
    }

    pub fn members(&self) -> &[RectId] {
        &self.members
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn origin(&self) -> LineOrigin {
        self.origin
    }

    pub(crate) fn set_endpoints(&mut self, p1: Point, p2: Point) {
        debug_assert!(!self.locked, "locked line endpoints are immutable");
        self.p1 = p1;
        self.p2 = p2;
    }

    pub(crate) fn lock(&mut self) {
        self.locked = true;
    }

    pub fn length(&self) -> f64 {
        self.p1.distance_to(self.p2)
    }

    /// `None` for (near-)vertical segments
    pub fn slope(&self) -> Option<f64> {
        let dx = self.p2.x - self.p1.x;
        if dx.abs() < 1e-9 {
            return None;
        }
        Some((self.p2.y - self.p1.y) / dx)
    }

    /// The line's y at x = 0, `None` for vertical segments
    pub fn intercept(&self) -> Option<f64> {
        self.slope().map(|m| self.p1.y - m * self.p1.x)
    }

    pub fn is_horizontal(&self, epsilon: f64) -> bool {
        self.slope().is_some_and(|m| m.abs() < epsilon)
    }

    /// The infinite line's y at `x`
    pub fn y_at(&self, x: f64) -> Option<f64> {
        let m = self.slope()?;
        Some(self.p1.y + m * (x - self.p1.x))
    }

    /// Distance used to rank competing lines for a point: vertical distance
    /// to the line at the point's x, or the distance to the segment when the
    /// line is vertical.
    pub fn row_distance(&self, point: Point) -> f64 {
        match self.y_at(point.x) {
            Some(y) => (point.y - y).abs(),
            None => self.distance_to_point(point),
        }
    }

    pub fn distance_to_point(&self, point: Point) -> f64 {
        point_segment_distance(point, self.p1, self.p2)
    }

    /// Endpoint closest to `point`, with its distance
    pub fn nearest_endpoint(&self, point: Point) -> (Endpoint, f64) {
        let d1 = self.p1.distance_to(point);
        let d2 = self.p2.distance_to(point);
        if d2 < d1 {
            (Endpoint::End, d2)
        } else {
            (Endpoint::Start, d1)
        }
    }

    /// Membership test: the segment crosses the box or an endpoint lies in it
    pub fn intersects_rect(&self, rect: &Rectangle) -> bool {
        segment_intersects_rect(self.p1, self.p2, &rect.to_geo_rect())
    }

    pub fn crosses(&self, other: &RowLine) -> bool {
        segments_cross(self.p1, self.p2, other.p1, other.p2)
    }

    pub fn crosses_segment(&self, a: Point, b: Point) -> bool {
        segments_cross(self.p1, self.p2, a, b)
    }
}
