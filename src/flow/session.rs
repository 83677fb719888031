use serde::{Deserialize, Serialize};

use crate::flow::config::{Orientation, GAP, NODE_HEIGHT, NODE_WIDTH};
use crate::graph::{EdgeStyle, FlowGraph, GraphEdge, GraphNode, Position, APP_NODE_KIND};
use crate::models::{AppTransition, AttachedEvent, TimelineEvent};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Payload of one focus interval card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusNodeData {
    pub app_name: String,
    pub start_timestamp: i64,
    /// `None` while the interval is still open (the app currently in focus).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<i64>,
    pub events: Vec<AttachedEvent>,
}

impl FocusNodeData {
    /// Half-open `[start, end)` membership; an open end extends to infinity.
    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start_timestamp && self.end_timestamp.map_or(true, |end| ts < end)
    }
}

pub type SessionFlow = FlowGraph<FocusNodeData>;

/// Turn one window's chronological events into a linear chain of focus intervals.
///
/// `events` must already be in ascending order. Input without any transition
/// produces an empty graph.
pub fn build_session_flow(events: &[TimelineEvent], orientation: Orientation) -> SessionFlow {
    let (transitions, others) = split_events(events);

    // Edge case: nothing ever took focus
    let Some(first) = transitions.first() else {
        return SessionFlow::empty();
    };

    let sequence: Vec<&str> = std::iter::once(first.from_app.as_str())
        .chain(transitions.iter().map(|t| t.to_app.as_str()))
        .collect();
    let total = sequence.len();
    let side = grid_side(total);

    let mut nodes = Vec::with_capacity(total);
    let mut edges = Vec::with_capacity(total - 1);

    for (i, app_name) in sequence.iter().enumerate() {
        // Synthetic one-second left boundary keeps the first interval non-empty
        let start_timestamp = match i {
            0 => first.ts.saturating_sub(1),
            _ => transitions[i - 1].ts,
        };
        let end_timestamp = transitions.get(i).map(|t| t.ts);

        nodes.push(GraphNode {
            id: node_id(i),
            kind: APP_NODE_KIND.to_string(),
            position: grid_position(i, side, orientation),
            data: FocusNodeData {
                app_name: (*app_name).to_string(),
                start_timestamp,
                end_timestamp,
                events: Vec::new(),
            },
        });

        if i > 0 {
            edges.push(GraphEdge {
                id: format!("edge-{}", i - 1),
                source: node_id(i - 1),
                target: node_id(i),
                label: transitions[i - 1].transition_type.clone(),
                animated: false,
                style: EdgeStyle::Default,
            });
        }
    }

    attach_events(&mut nodes, others);

    log_debug!(
        "session flow built: {} nodes, {} edges from {} events",
        nodes.len(),
        edges.len(),
        events.len()
    );

    SessionFlow { nodes, edges }
}

fn split_events(events: &[TimelineEvent]) -> (Vec<&AppTransition>, Vec<AttachedEvent>) {
    let mut transitions = Vec::new();
    let mut others = Vec::new();

    for event in events {
        match event {
            TimelineEvent::AppTransition(t) => transitions.push(t),
            TimelineEvent::WindowEvent(w) => others.push(AttachedEvent::Window(w.clone())),
            TimelineEvent::Screenshot(s) => others.push(AttachedEvent::Screenshot(s.clone())),
        }
    }

    (transitions, others)
}

/// Attach each non-transition event to the interval covering its timestamp.
fn attach_events(nodes: &mut [GraphNode<FocusNodeData>], others: Vec<AttachedEvent>) {
    for event in others {
        let ts = event.ts();
        match nodes.iter_mut().find(|node| node.data.contains(ts)) {
            Some(node) => node.data.events.push(event),
            None => {
                // Only reachable for events older than the first transition's boundary
                log_warn!("dropping timeline event at {ts}: outside every focus interval");
            }
        }
    }
}

fn node_id(index: usize) -> String {
    format!("node-{index}")
}

/// Smallest square grid side that fits `total` cards.
fn grid_side(total: usize) -> usize {
    let mut side = (total as f64).sqrt().ceil() as usize;
    // Guard against float rounding on large perfect squares
    while side * side < total {
        side += 1;
    }
    side.max(1)
}

fn grid_position(index: usize, side: usize, orientation: Orientation) -> Position {
    let (col, row) = match orientation {
        Orientation::Horizontal => (index % side, index / side),
        Orientation::Vertical => (index / side, index % side),
    };

    Position::new(
        col as f64 * (NODE_WIDTH + GAP),
        row as f64 * (NODE_HEIGHT + GAP),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Screenshot, WindowEvent, WindowEventKind};

    fn transition(from: &str, to: &str, ts: i64, kind: &str) -> TimelineEvent {
        TimelineEvent::AppTransition(AppTransition {
            from_app: from.into(),
            to_app: to.into(),
            ts,
            transition_type: kind.into(),
        })
    }

    fn screenshot(ts: i64) -> TimelineEvent {
        TimelineEvent::Screenshot(Screenshot {
            path: format!("/shots/{ts}.png"),
            ts,
        })
    }

    fn window(kind: WindowEventKind, ts: i64) -> TimelineEvent {
        TimelineEvent::WindowEvent(WindowEvent {
            event_type: kind,
            window_title: "Editor".into(),
            app_id: "B".into(),
            ts,
        })
    }

    #[test]
    fn builds_chain_with_contiguous_intervals() {
        let events = vec![
            transition("A", "B", 100, "switch"),
            transition("B", "C", 200, "switch"),
        ];

        let flow = build_session_flow(&events, Orientation::Horizontal);

        let summary: Vec<(&str, i64, Option<i64>)> = flow
            .nodes
            .iter()
            .map(|n| (n.data.app_name.as_str(), n.data.start_timestamp, n.data.end_timestamp))
            .collect();
        assert_eq!(
            summary,
            vec![("A", 99, Some(100)), ("B", 100, Some(200)), ("C", 200, None)]
        );

        let edges: Vec<(&str, &str, &str)> = flow
            .edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str(), e.label.as_str()))
            .collect();
        assert_eq!(
            edges,
            vec![("node-0", "node-1", "switch"), ("node-1", "node-2", "switch")]
        );
    }

    #[test]
    fn earliest_possible_timestamp_does_not_overflow() {
        let flow = build_session_flow(
            &[transition("A", "B", i64::MIN, "switch")],
            Orientation::Horizontal,
        );

        assert_eq!(flow.nodes[0].data.start_timestamp, i64::MIN);
        assert_eq!(flow.nodes[0].data.end_timestamp, Some(i64::MIN));
        assert_eq!(flow.nodes[1].data.start_timestamp, i64::MIN);
    }

    #[test]
    fn empty_or_transition_free_input_gives_empty_graph() {
        assert!(build_session_flow(&[], Orientation::Horizontal).is_empty());

        let flow = build_session_flow(&[screenshot(5), screenshot(9)], Orientation::Vertical);
        assert!(flow.nodes.is_empty());
        assert!(flow.edges.is_empty());
    }

    #[test]
    fn attaches_events_to_covering_interval() {
        let events = vec![
            screenshot(99),
            transition("A", "B", 100, "switch"),
            window(WindowEventKind::Maximize, 100),
            screenshot(150),
            transition("B", "C", 200, "new"),
            screenshot(10_000),
        ];

        let flow = build_session_flow(&events, Orientation::Horizontal);

        let counts: Vec<usize> = flow.nodes.iter().map(|n| n.data.events.len()).collect();
        assert_eq!(counts, vec![1, 2, 1]);
        assert_eq!(flow.nodes[1].data.events[0].ts(), 100);
        assert_eq!(flow.edges[1].label, "new");
    }

    #[test]
    fn drops_events_before_first_boundary() {
        let events = vec![screenshot(1), transition("A", "B", 100, "switch")];

        let flow = build_session_flow(&events, Orientation::Horizontal);

        assert!(flow.nodes.iter().all(|n| n.data.events.is_empty()));
    }

    #[test]
    fn k_transitions_give_k_plus_one_nodes_on_a_single_path() {
        let apps = ["A", "B", "A", "C", "A", "D", "E"];
        let events: Vec<TimelineEvent> = apps
            .windows(2)
            .enumerate()
            .map(|(i, pair)| transition(pair[0], pair[1], 1_000 + i as i64 * 60, "switch"))
            .collect();

        let flow = build_session_flow(&events, Orientation::Horizontal);

        assert_eq!(flow.nodes.len(), events.len() + 1);
        assert_eq!(flow.edges.len(), events.len());
        for (i, edge) in flow.edges.iter().enumerate() {
            assert_eq!(edge.source, flow.nodes[i].id);
            assert_eq!(edge.target, flow.nodes[i + 1].id);
        }
        for pair in flow.nodes.windows(2) {
            assert_eq!(pair[0].data.end_timestamp, Some(pair[1].data.start_timestamp));
        }
        assert_eq!(flow.nodes.last().unwrap().data.end_timestamp, None);
    }

    #[test]
    fn lays_out_square_grid_in_both_orientations() {
        // 4 transitions -> 5 nodes -> 3x3 grid
        let events: Vec<TimelineEvent> = (0..4)
            .map(|i| transition("X", "Y", 10 + i, "switch"))
            .collect();

        let horizontal = build_session_flow(&events, Orientation::Horizontal);
        let vertical = build_session_flow(&events, Orientation::Vertical);

        // index 4 -> (col 1, row 1) horizontally and vertically
        assert_eq!(horizontal.nodes[4].position, Position::new(400.0, 220.0));
        assert_eq!(vertical.nodes[4].position, Position::new(400.0, 220.0));
        // index 2 -> (2, 0) row-major, (0, 2) column-major
        assert_eq!(horizontal.nodes[2].position, Position::new(800.0, 0.0));
        assert_eq!(vertical.nodes[2].position, Position::new(0.0, 440.0));
    }

    #[test]
    fn rebuilding_same_input_is_structurally_identical() {
        let events = vec![
            transition("A", "B", 100, "switch"),
            screenshot(120),
            transition("B", "A", 130, "switch"),
        ];

        let first = build_session_flow(&events, Orientation::Horizontal);
        let second = build_session_flow(&events, Orientation::Horizontal);

        assert_eq!(first, second);
    }
}
