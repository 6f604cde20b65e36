use serde::{Deserialize, Serialize};

use super::action::Action;
use super::SequenceId;

/// A connecting edge between two nodes (spec.md §3). `trajectory` is
/// kept opaque (raw JSON) — its shape is VDA 5050's NURBS trajectory
/// object, which the core never interprets, only forwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub edge_id: String,
    pub sequence_id: SequenceId,
    pub released: bool,
    pub start_node_id: String,
    pub end_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<serde_json::Value>,
    pub actions: Vec<Action>,
}

impl Edge {
    pub fn new(
        edge_id: impl Into<String>,
        sequence_id: SequenceId,
        released: bool,
        start_node_id: impl Into<String>,
        end_node_id: impl Into<String>,
    ) -> Self {
        Self {
            edge_id: edge_id.into(),
            sequence_id,
            released,
            start_node_id: start_node_id.into(),
            end_node_id: end_node_id.into(),
            trajectory: None,
            actions: Vec::new(),
        }
    }
}
