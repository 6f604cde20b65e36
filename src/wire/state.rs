use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::common::Header;
use crate::model::{ActionState, SequenceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorLevel {
    Warning,
    Fatal,
}

/// A protocol error surfaced on the next `State` (spec.md §6, §7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorRecord {
    pub error_type: String,
    pub error_level: ErrorLevel,
    #[serde(default)]
    pub error_references: HashMap<String, String>,
    pub error_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfoRecord {
    pub info_type: String,
    pub info_description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BatteryState {
    pub battery_charge: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_voltage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_health: Option<u8>,
    pub charging: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reach: Option<u32>,
}

/// The canonical outbound `state` message (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateMessage {
    #[serde(flatten)]
    pub header: Header,
    pub order_id: String,
    pub order_update_id: u32,
    pub last_node_id: String,
    pub last_node_sequence_id: SequenceId,
    #[serde(default)]
    pub node_states: Vec<super::order::NodeWire>,
    #[serde(default)]
    pub edge_states: Vec<super::order::EdgeWire>,
    #[serde(default)]
    pub action_states: Vec<ActionState>,
    pub driving: bool,
    #[serde(default)]
    pub distance_since_last_node: Option<f64>,
    pub operating_mode: String,
    pub battery_state: BatteryState,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
    #[serde(default)]
    pub information: Vec<InfoRecord>,
    pub new_base_requested: bool,
    pub order_status: String,
}
