use serde::{Deserialize, Serialize};

use super::common::Header;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Online,
    Offline,
    Connectionbroken,
}

/// Retained connection message. A "broken" state is published as a
/// last-will on unexpected disconnect; "online" on connect (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    #[serde(flatten)]
    pub header: Header,
    pub connection_state: ConnectionState,
}
