//! Segment predicates shared by membership and the non-crossing check.

use geo::{EuclideanDistance, Intersects};
use geo_types::{Line, Rect};

use crate::types::Point;

const EPSILON: f64 = 1e-9;

/// Sign of the turn `a -> b -> c`: 1 counter-clockwise, -1 clockwise, 0 collinear
fn orientation(a: Point, b: Point, c: Point) -> i8 {
    let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    if cross > EPSILON {
        1
    } else if cross < -EPSILON {
        -1
    } else {
        0
    }
}

/// Length of the overlap of two collinear segments, projected on their direction
fn collinear_overlap(a1: Point, a2: Point, b1: Point, b2: Point) -> f64 {
    let (dx, dy) = (a2.x - a1.x, a2.y - a1.y);
    let length = (dx * dx + dy * dy).sqrt();
    if length < EPSILON {
        return 0.0;
    }
    let project = |p: Point| ((p.x - a1.x) * dx + (p.y - a1.y) * dy) / length;
    let (b_lo, b_hi) = {
        let (s, t) = (project(b1), project(b2));
        (s.min(t), s.max(t))
    };
    (length.min(b_hi) - 0.0f64.max(b_lo)).max(0.0)
}

/// Whether two segments cross.
///
/// Proper crossings and collinear overlaps of positive length count.
/// Segments touching at a single point, such as lines drawn end to end,
/// do not.
pub fn segments_cross(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let o1 = orientation(a1, a2, b1);
    let o2 = orientation(a1, a2, b2);
    let o3 = orientation(b1, b2, a1);
    let o4 = orientation(b1, b2, a2);

    if o1 == 0 && o2 == 0 && o3 == 0 && o4 == 0 {
        return collinear_overlap(a1, a2, b1, b2) > EPSILON;
    }

    o1 * o2 < 0 && o3 * o4 < 0
}

/// Strictly inside the triangle `t`; points on its boundary are outside
fn inside_triangle(p: Point, t: [Point; 3]) -> bool {
    let o = [
        orientation(t[0], t[1], p),
        orientation(t[1], t[2], p),
        orientation(t[2], t[0], p),
    ];
    o.iter().all(|&s| s == 1) || o.iter().all(|&s| s == -1)
}

/// Whether `a-b` crosses an edge of triangle `t` or has an endpoint inside it
fn enters_triangle(a: Point, b: Point, t: [Point; 3]) -> bool {
    let edges = [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])];
    edges.iter().any(|&(p, q)| segments_cross(a, b, p, q))
        || inside_triangle(a, t)
        || inside_triangle(b, t)
}

/// Whether `a-b` lies in the region swept by a segment moving from `from` to `to`.
///
/// The region is the hull of the four endpoints: the quadrilateral
/// `from.0, from.1, to.1, to.0` for a translation, the triangle
/// `fixed, old, new` when one endpoint stays put. Touching its boundary at a
/// single point does not count.
pub fn crosses_sweep(a: Point, b: Point, from: (Point, Point), to: (Point, Point)) -> bool {
    let corners = [from.0, from.1, to.1, to.0];
    [[0, 1, 2], [0, 2, 3], [0, 1, 3], [1, 2, 3]]
        .iter()
        .any(|&[i, j, k]| enters_triangle(a, b, [corners[i], corners[j], corners[k]]))
}

/// Segment vs. closed axis-aligned box: any edge crossing, or an endpoint inside
pub fn segment_intersects_rect(p1: Point, p2: Point, rect: &Rect<f64>) -> bool {
    Line::new(p1.to_coord(), p2.to_coord()).intersects(rect)
}

/// Euclidean distance from `p` to the closest point of the segment
pub fn point_segment_distance(p: Point, s1: Point, s2: Point) -> f64 {
    geo_types::Point::from(p.to_coord()).euclidean_distance(&Line::new(s1.to_coord(), s2.to_coord()))
}
