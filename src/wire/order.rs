use serde::{Deserialize, Serialize};

use super::common::Header;
use crate::model::{Action, SequenceId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodePositionWire {
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

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeWire {
    pub node_id: String,
    pub sequence_id: SequenceId,
    pub released: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_position: Option<NodePositionWire>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeWire {
    pub edge_id: String,
    pub sequence_id: SequenceId,
    pub released: bool,
    pub start_node_id: String,
    pub end_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<serde_json::Value>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl From<&crate::model::NodePosition> for NodePositionWire {
    fn from(p: &crate::model::NodePosition) -> Self {
        Self {
            x: p.x,
            y: p.y,
            theta: p.theta,
            map_id: p.map_id.clone(),
            allowed_deviation_xy: p.allowed_deviation_xy,
            allowed_deviation_theta: p.allowed_deviation_theta,
        }
    }
}

impl From<&crate::model::Node> for NodeWire {
    fn from(n: &crate::model::Node) -> Self {
        Self {
            node_id: n.node_id.clone(),
            sequence_id: n.sequence_id,
            released: n.released,
            node_position: n.node_position.as_ref().map(NodePositionWire::from),
            actions: n.actions.clone(),
        }
    }
}

impl From<&crate::model::Edge> for EdgeWire {
    fn from(e: &crate::model::Edge) -> Self {
        Self {
            edge_id: e.edge_id.clone(),
            sequence_id: e.sequence_id,
            released: e.released,
            start_node_id: e.start_node_id.clone(),
            end_node_id: e.end_node_id.clone(),
            trajectory: e.trajectory.clone(),
            actions: e.actions.clone(),
        }
    }
}

/// The top-level `order` message (spec.md §6). Field names follow the
/// VDA 5050 JSON schema (camelCase via `serde`'s default here is left to
/// the adapter; this crate models the logical shape).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderMessage {
    #[serde(flatten)]
    pub header: Header,
    pub order_id: String,
    pub order_update_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_set_id: Option<String>,
    pub nodes: Vec<NodeWire>,
    pub edges: Vec<EdgeWire>,
}
