use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::flow::config::AggregateLayout;
use crate::graph::{EdgeStyle, FlowGraph, GraphEdge, GraphNode, Position, APP_NODE_KIND};
use crate::models::FlowRecord;

const ENABLE_LOGS: bool = true;

use crate::log_debug;

const SWITCH_TRANSITION: &str = "switch";

/// Payload of one application node, taken from the record that introduced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppNodeData {
    pub app_name: String,
    pub time: String,
    pub transition_type: String,
    pub created_at: i64,
}

pub type AggregateFlow = FlowGraph<AppNodeData>;

/// Counts shown next to the aggregate graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowStats {
    /// Distinct app ids referenced by any record.
    pub apps: usize,
    /// Raw record count, duplicates included.
    pub transitions: usize,
}

impl FlowStats {
    pub fn from_records(records: &[FlowRecord]) -> Self {
        let apps: HashSet<&str> = records
            .iter()
            .flat_map(|r| [r.from_app.as_str(), r.to_app.as_str()])
            .collect();

        Self {
            apps: apps.len(),
            transitions: records.len(),
        }
    }
}

/// Left-to-right row filler; a slot is handed out once and never revisited.
struct RowCursor {
    spacing: f64,
    row_height: f64,
    per_row: usize,
    slot: usize,
    row: usize,
}

impl RowCursor {
    fn new(layout: &AggregateLayout) -> Self {
        Self {
            spacing: layout.node_spacing,
            row_height: layout.row_height,
            per_row: layout.max_nodes_per_row.max(1),
            slot: 0,
            row: 0,
        }
    }

    fn next(&mut self) -> Position {
        if self.slot == self.per_row {
            self.slot = 0;
            self.row += 1;
        }
        let position = Position::new(
            self.slot as f64 * self.spacing,
            self.row as f64 * self.row_height,
        );
        self.slot += 1;
        position
    }
}

/// Summarise an unordered bag of transitions as a deduplicated app graph.
///
/// One node per distinct app id, at most one edge per ordered `(from, to)`
/// pair. The first record seen for a pair decides the edge label and style.
pub fn build_aggregate_flow(records: &[FlowRecord], layout: &AggregateLayout) -> AggregateFlow {
    let mut nodes: Vec<GraphNode<AppNodeData>> = Vec::new();
    let mut known_apps: HashSet<&str> = HashSet::new();
    let mut seen_pairs: HashSet<(&str, &str)> = HashSet::new();
    let mut edges = Vec::new();
    let mut cursor = RowCursor::new(layout);

    for (index, record) in records.iter().enumerate() {
        for app in [record.from_app.as_str(), record.to_app.as_str()] {
            if !known_apps.insert(app) {
                continue;
            }
            nodes.push(GraphNode {
                id: app_node_id(app),
                kind: APP_NODE_KIND.to_string(),
                position: cursor.next(),
                data: AppNodeData {
                    app_name: app.to_string(),
                    time: record.time.clone(),
                    transition_type: record.transition_type.clone(),
                    created_at: record.created_at,
                },
            });
        }

        if !seen_pairs.insert((record.from_app.as_str(), record.to_app.as_str())) {
            continue;
        }

        edges.push(GraphEdge {
            id: format!("edge-{index}"),
            source: app_node_id(&record.from_app),
            target: app_node_id(&record.to_app),
            label: record.transition_type.clone(),
            animated: layout.animated,
            style: edge_style(&record.transition_type),
        });
    }

    log_debug!(
        "aggregate flow built: {} nodes, {} edges from {} records",
        nodes.len(),
        edges.len(),
        records.len()
    );

    AggregateFlow { nodes, edges }
}

fn app_node_id(app: &str) -> String {
    format!("app-{app}")
}

fn edge_style(transition_type: &str) -> EdgeStyle {
    if transition_type == SWITCH_TRANSITION {
        EdgeStyle::Switch
    } else {
        EdgeStyle::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(from: &str, to: &str, kind: &str) -> FlowRecord {
        FlowRecord {
            from_app: from.into(),
            to_app: to.into(),
            transition_type: kind.into(),
            time: "09:00:00".into(),
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn duplicate_pairs_collapse_to_first_edge() {
        let records = vec![
            record("A", "B", "switch"),
            record("B", "A", "switch"),
            record("A", "B", "new"),
        ];

        let flow = build_aggregate_flow(&records, &AggregateLayout::default());

        let ids: Vec<&str> = flow.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["app-A", "app-B"]);

        let edges: Vec<(&str, &str, &str)> = flow
            .edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str(), e.label.as_str()))
            .collect();
        assert_eq!(
            edges,
            vec![("app-A", "app-B", "switch"), ("app-B", "app-A", "switch")]
        );
        assert!(flow.edges.iter().all(|e| e.style == EdgeStyle::Switch));
    }

    #[test]
    fn styles_non_switch_transitions_differently() {
        let flow = build_aggregate_flow(
            &[record("A", "B", "new_window"), record("B", "C", "switch")],
            &AggregateLayout::default(),
        );

        assert_eq!(flow.edges[0].style, EdgeStyle::Other);
        assert_eq!(flow.edges[1].style, EdgeStyle::Switch);
        assert_eq!(flow.edges[1].id, "edge-1");
    }

    #[test]
    fn node_and_edge_counts_follow_distinct_apps_and_pairs() {
        let records = vec![
            record("A", "B", "switch"),
            record("B", "C", "switch"),
            record("C", "A", "switch"),
            record("A", "B", "switch"),
            record("C", "C", "switch"),
            record("D", "A", "new"),
        ];

        let flow = build_aggregate_flow(&records, &AggregateLayout::default());
        let stats = FlowStats::from_records(&records);

        assert_eq!(flow.nodes.len(), 4);
        assert_eq!(stats, FlowStats { apps: 4, transitions: 6 });
        assert_eq!(flow.edges.len(), 5);

        let mut pairs: Vec<(&str, &str)> = flow
            .edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs.len(), flow.edges.len());
    }

    #[test]
    fn wraps_rows_after_max_nodes() {
        let layout = AggregateLayout {
            node_spacing: 100.0,
            max_nodes_per_row: 2,
            row_height: 50.0,
            animated: false,
        };
        let records = vec![record("A", "B", "switch"), record("C", "D", "switch"), record("E", "A", "switch")];

        let flow = build_aggregate_flow(&records, &layout);

        let positions: Vec<Position> = flow.nodes.iter().map(|n| n.position).collect();
        assert_eq!(
            positions,
            vec![
                Position::new(0.0, 0.0),
                Position::new(100.0, 0.0),
                Position::new(0.0, 50.0),
                Position::new(100.0, 50.0),
                Position::new(0.0, 100.0),
            ]
        );
        assert!(flow.edges.iter().all(|e| !e.animated));
    }

    #[test]
    fn node_payload_comes_from_first_sighting() {
        let mut later = record("B", "A", "new");
        later.time = "10:00:00".into();
        let flow = build_aggregate_flow(
            &[record("A", "B", "switch"), later],
            &AggregateLayout::default(),
        );

        let a = flow.node("app-A").unwrap();
        assert_eq!(a.data.time, "09:00:00");
        assert_eq!(a.data.transition_type, "switch");
    }

    #[test]
    fn rebuilding_same_bag_is_structurally_identical() {
        let records = vec![
            record("A", "B", "switch"),
            record("B", "C", "new"),
            record("C", "A", "switch"),
            record("A", "B", "close"),
            record("B", "C", "switch"),
            record("C", "C", "switch"),
        ];
        let layout = AggregateLayout {
            max_nodes_per_row: 2,
            ..AggregateLayout::default()
        };

        let first = build_aggregate_flow(&records, &layout);
        let second = build_aggregate_flow(&records, &layout);

        assert_eq!(first, second);
        assert_eq!(first.nodes.len(), 3);
        assert_eq!(first.edges.len(), 4);
    }

    #[test]
    fn empty_bag_gives_empty_graph() {
        let flow = build_aggregate_flow(&[], &AggregateLayout::default());
        assert!(flow.is_empty());
        assert!(flow.edges.is_empty());
        assert_eq!(FlowStats::from_records(&[]), FlowStats::default());
    }
}
