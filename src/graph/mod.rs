//! Render-layer graph shape shared by both flow builders.
//!
//! The drawing surface is an external collaborator; these types only carry
//! ids, positions, labels and per-node payloads.

use serde::{Deserialize, Serialize};

pub const APP_NODE_KIND: &str = "appNode";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode<T> {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub position: Position,
    pub data: T,
}

/// Visual class of an edge; the render layer maps these onto colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStyle {
    Default,
    Switch,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: String,
    pub animated: bool,
    pub style: EdgeStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph<T> {
    pub nodes: Vec<GraphNode<T>>,
    pub edges: Vec<GraphEdge>,
}

impl<T> Default for FlowGraph<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

impl<T> FlowGraph<T> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode<T>> {
        self.nodes.iter().find(|node| node.id == id)
    }
}
