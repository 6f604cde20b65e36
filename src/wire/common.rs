use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prelude fields carried by every outbound message (spec.md §6).
/// `header_id` is monotone per message kind; filled in by the egress
/// port, not by the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Header {
    pub header_id: u32,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub manufacturer: String,
    pub serial_number: String,
}
