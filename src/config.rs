//! Runtime configuration.
//!
//! Construction from a TOML file is explicitly out of scope (spec.md
//! §1, §6): this crate only defines the shape a caller fills in, the way
//! the teacher's `tooling::config::ConfigBuilder` separates "what the
//! fields are" from "how they get populated".

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub manufacturer: String,
    pub serial_number: String,
    pub interface: String,
    pub compatible_versions: Vec<String>,
    pub state_update_max_period: Duration,
    pub visualization_period: Duration,
    pub synchronized_event_deadline: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manufacturer: "example".to_string(),
            serial_number: "agv-001".to_string(),
            interface: "uagv".to_string(),
            compatible_versions: vec!["2.0.0".to_string()],
            state_update_max_period: Duration::from_secs(30),
            visualization_period: Duration::from_secs(1),
            synchronized_event_deadline: Duration::from_secs(1),
        }
    }
}
