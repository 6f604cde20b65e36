use serde::{Deserialize, Serialize};

use super::common::Header;

/// Retained factsheet message. Assembly of the static AGV-description
/// payload is explicitly out of scope (spec.md §1) — the core only
/// forwards whatever the factsheet port hands it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Factsheet {
    #[serde(flatten)]
    pub header: Header,
    pub payload: serde_json::Value,
}
