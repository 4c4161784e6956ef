//! Row lines: fitting, editing and locking the segments that group
//! rectangles into ordered rows.

pub mod cluster;
pub mod editor;
pub mod line;
pub mod segment;
pub mod set;

pub use cluster::{detect_rows, ClusterReport};
pub use editor::{DragContext, EditMode, EditOutcome, Editor};
pub use line::{Endpoint, LineId, LineOrigin, RowLine};
pub use segment::segments_cross;
pub use set::{OrphanPolicy, RowSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Tunables for automatic clustering and interactive editing.
/// Distances are in preview pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RowConfig {
    /// Band tolerance for vertical centres, as a fraction of mean box height
    #[schemars(range(min = 0.0, max = 2.0))]
    pub vertical_tolerance_ratio: f64,
    /// Largest horizontal gap inside a row, as a multiple of mean box width
    #[schemars(range(min = 0.0))]
    pub horizontal_gap_ratio: f64,
    /// Fitted lines steeper than this are flattened
    #[schemars(range(min = 0.0))]
    pub max_slope: f64,
    /// Extension of fitted lines past the outermost boxes, as a fraction of the row span
    #[schemars(range(min = 0.0))]
    pub extension_ratio: f64,
    /// Below this |slope| a line is treated as horizontal when ordering rows
    pub horizontal_epsilon: f64,
    pub min_line_length: f64,
    pub line_pick_tolerance: f64,
    pub endpoint_pick_tolerance: f64,
    pub corner_pick_tolerance: f64,
}

impl Default for RowConfig {
    fn default() -> Self {
        Self {
            vertical_tolerance_ratio: 0.35,
            horizontal_gap_ratio: 2.0,
            max_slope: 0.25,
            extension_ratio: 0.2,
            horizontal_epsilon: 0.01,
            min_line_length: 10.0,
            line_pick_tolerance: 20.0,
            endpoint_pick_tolerance: 30.0,
            corner_pick_tolerance: 8.0,
        }
    }
}
