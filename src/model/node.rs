use serde::{Deserialize, Serialize};

use super::action::Action;
use super::SequenceId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theta: Option<f64>,
    #[serde(rename = "mapId")]
    pub map_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_deviation_xy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_deviation_theta: Option<f64>,
}

/// A single waypoint in an order's graph (spec.md §3).
///
/// Lifetime: created when the order carrying it is accepted, persists
/// until the order's graph is trimmed past it or replaced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub node_id: String,
    pub sequence_id: SequenceId,
    pub released: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_position: Option<NodePosition>,
    pub actions: Vec<Action>,
}

impl Node {
    pub fn new(node_id: impl Into<String>, sequence_id: SequenceId, released: bool) -> Self {
        Self {
            node_id: node_id.into(),
            sequence_id,
            released,
            node_position: None,
            actions: Vec::new(),
        }
    }
}
