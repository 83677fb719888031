use serde::{Deserialize, Serialize};

/// Session flow card width in pixels.
pub const NODE_WIDTH: f64 = 320.0;
/// Session flow card height in pixels.
pub const NODE_HEIGHT: f64 = 140.0;
/// Spacing between session flow cards in both directions.
pub const GAP: f64 = 80.0;

/// Direction the session grid is filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Row-major: fill a row left to right, then wrap down.
    #[default]
    Horizontal,
    /// Column-major: fill a column top to bottom, then wrap right.
    Vertical,
}

/// Layout tunables for the aggregate flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateLayout {
    /// Horizontal distance between neighbouring nodes in a row.
    pub node_spacing: f64,

    /// Nodes placed in a row before wrapping to the next one
    pub max_nodes_per_row: usize,

    /// Vertical distance between rows.
    pub row_height: f64,

    pub animated: bool,
}

impl Default for AggregateLayout {
    fn default() -> Self {
        Self {
            node_spacing: 300.0,
            max_nodes_per_row: 4,
            row_height: 200.0,
            animated: true,
        }
    }
}
