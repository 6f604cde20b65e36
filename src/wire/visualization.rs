use serde::{Deserialize, Serialize};

use super::common::Header;

/// Built from a subset of the status snapshot — position and velocity
/// only (spec.md §4.10).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Visualization {
    #[serde(flatten)]
    pub header: Header,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theta: Option<f64>,
    pub velocity_vx: f64,
    pub velocity_vy: f64,
    pub velocity_omega: f64,
}
