//! Automatic row detection: band rectangles by vertical centre, split bands
//! at large horizontal gaps, and fit one line per group.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::line::{LineId, LineOrigin};
use super::set::{OrphanPolicy, RowSet};
use super::RowConfig;
use crate::error::OtolithError;
use crate::rect::{mean_size, RectId, Rectangle, RectangleSet};
use crate::types::Point;

/// Outcome of one automatic run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterReport {
    pub lines_created: usize,
    /// Fitted lines dropped because they would cross a locked line
    pub lines_rejected: usize,
    /// Rectangles handed to the nearest line after fitting
    pub orphans_assigned: usize,
    /// Rectangles left without a row
    pub unclaimed: usize,
}

/// Group rectangles into rows, top to bottom and left to right within a row.
pub fn group_rectangles<'a>(rects: &[&'a Rectangle], config: &RowConfig) -> Vec<Vec<&'a Rectangle>> {
    let Some((mean_width, mean_height)) = mean_size(rects.iter().copied()) else {
        return Vec::new();
    };
    let vertical_tolerance = config.vertical_tolerance_ratio * mean_height;
    let max_gap = config.horizontal_gap_ratio * mean_width;

    let mut sorted = rects.to_vec();
    sorted.sort_by(|a, b| a.center().y.total_cmp(&b.center().y));

    // Bands of consecutive rectangles close to the band's running mean centre
    let mut bands: Vec<Vec<&Rectangle>> = Vec::new();
    let mut band_mean = 0.0;
    for rect in sorted {
        let cy = rect.center().y;
        match bands.last_mut() {
            Some(band) if (cy - band_mean).abs() <= vertical_tolerance => {
                band.push(rect);
                band_mean += (cy - band_mean) / band.len() as f64;
            }
            _ => {
                bands.push(vec![rect]);
                band_mean = cy;
            }
        }
    }

    // Split each band wherever the gap to the last box of the forming group is too wide
    let mut groups = Vec::new();
    for mut band in bands {
        band.sort_by(|a, b| a.center().x.total_cmp(&b.center().x));
        let mut group: Vec<&Rectangle> = Vec::new();
        for rect in band {
            if let Some(last) = group.last() {
                if rect.x1() - last.x2() > max_gap {
                    groups.push(std::mem::take(&mut group));
                }
            }
            group.push(rect);
        }
        if !group.is_empty() {
            groups.push(group);
        }
    }
    groups
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Ordinary least squares through `(x, y)` pairs, `None` when all x coincide
pub fn least_squares(points: &[Point]) -> Option<(f64, f64)> {
    let n = points.len() as f64;
    if points.len() < 2 {
        return None;
    }
    let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;
    let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), p| {
        let dx = p.x - mean_x;
        (sxx + dx * dx, sxy + dx * (p.y - mean_y))
    });
    if sxx.abs() < 1e-12 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

/// Fit the row segment for a non-empty group.
///
/// Steep or undefined fits fall back to a horizontal line through the median
/// centre. The segment spans the group plus `extension_ratio` of its width on
/// both sides, and is never shorter than `min_line_length`.
pub fn fit_line(group: &[&Rectangle], config: &RowConfig) -> (Point, Point) {
    let centers: Vec<Point> = group.iter().map(|r| r.center()).collect();
    let flat = |centers: &[Point]| {
        let mut ys: Vec<f64> = centers.iter().map(|c| c.y).collect();
        (0.0, median(&mut ys))
    };
    let (slope, intercept) = match least_squares(&centers) {
        Some((slope, intercept)) if slope.abs() <= config.max_slope => (slope, intercept),
        Some((slope, _)) => {
            debug!("Flattening fitted slope {:.3}", slope);
            flat(&centers)
        }
        None => flat(&centers),
    };

    let min_x = group.iter().map(|r| r.x1()).fold(f64::INFINITY, f64::min);
    let max_x = group.iter().map(|r| r.x2()).fold(f64::NEG_INFINITY, f64::max);
    let span = max_x - min_x;
    let mut extension = span * config.extension_ratio;

    let horizontal_length = |ext: f64| (span + 2.0 * ext) * (1.0 + slope * slope).sqrt();
    if horizontal_length(extension) < config.min_line_length {
        // pad slightly so rounding cannot leave the segment just under the minimum
        let target = config.min_line_length + 1e-6;
        extension = (target / (1.0 + slope * slope).sqrt() - span) / 2.0;
    }

    let start_x = min_x - extension;
    let end_x = max_x + extension;
    (
        Point::new(start_x, slope * start_x + intercept),
        Point::new(end_x, slope * end_x + intercept),
    )
}

/// Add an automatic line, unless it would cross a locked line
fn try_add(rows: &mut RowSet, segment: (Point, Point), config: &RowConfig) -> Option<LineId> {
    match rows.add_line(segment.0, segment.1, LineOrigin::Automatic, config.min_line_length) {
        Ok(id) => Some(id),
        Err(OtolithError::ForbiddenCrossing { locked }) => {
            warn!("Rejected automatic row line crossing locked line {}", locked);
            None
        }
        Err(e) => {
            warn!("Rejected automatic row line: {}", e);
            None
        }
    }
}

/// Rebuild the automatic rows of `rows` from `rects`.
///
/// Unlocked lines are discarded and locked lines keep whatever their segment
/// passes through. The remaining rectangles are clustered and one line is
/// fitted per group; a fitted line that would cross a locked line is dropped.
/// Rectangles of dropped groups get a line of their own when no unlocked line
/// exists. Membership is then rebuilt from the geometry alone, with
/// [`OrphanPolicy::NearestUnlocked`], so recomputing it later changes nothing.
pub fn detect_rows(rects: &RectangleSet, rows: &mut RowSet, config: &RowConfig) -> ClusterReport {
    let mut report = ClusterReport::default();

    let discarded = rows.remove_unlocked();
    rows.recompute_membership(rects, OrphanPolicy::Leave);
    let claimed: HashSet<RectId> = rows.claimed().collect();
    let free: Vec<&Rectangle> = rects.iter().filter(|r| !claimed.contains(&r.id())).collect();
    debug!(
        "Clustering {} free rectangles ({} claimed by locked lines, {} stale lines discarded)",
        free.len(),
        claimed.len(),
        discarded
    );

    let mut orphans: Vec<&Rectangle> = Vec::new();
    for group in group_rectangles(&free, config) {
        match try_add(rows, fit_line(&group, config), config) {
            Some(_) => report.lines_created += 1,
            None => {
                report.lines_rejected += 1;
                orphans.extend(group);
            }
        }
    }

    if rows.unlocked().next().is_none() {
        for rect in &orphans {
            if try_add(rows, fit_line(&[*rect], config), config).is_some() {
                report.lines_created += 1;
            }
        }
    }

    rows.recompute_membership(rects, OrphanPolicy::NearestUnlocked);
    report.orphans_assigned = orphans.iter().filter(|r| rows.row_of(r.id()).is_some()).count();
    report.unclaimed = rects.len() - rows.claimed().count();
    info!(
        "Detected {} rows ({} rejected, {} orphans reassigned, {} unclaimed)",
        report.lines_created, report.lines_rejected, report.orphans_assigned, report.unclaimed
    );
    report
}
