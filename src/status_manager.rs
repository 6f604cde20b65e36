//! Owns everything that isn't the order graph (spec.md §3, §4.4):
//! loads, battery, operating mode, position, velocity, errors/infos,
//! the new-base-requested flag, and distance since the last node.

use tokio::sync::Mutex;

use crate::wire::{ErrorLevel, ErrorRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub map_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    pub load_id: Option<String>,
    pub load_type: Option<String>,
    pub load_position: Option<String>,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Battery {
    pub charge: f64,
    pub reach: Option<u32>,
    pub charging: bool,
}

impl Default for Battery {
    fn default() -> Self {
        Self {
            charge: 100.0,
            reach: None,
            charging: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfoRecord {
    pub info_type: String,
    pub info_description: String,
}

struct Inner {
    loads: Vec<Load>,
    battery: Battery,
    operating_mode: String,
    position: Option<Position>,
    velocity: Velocity,
    driving: bool,
    distance_since_last_node: Option<f64>,
    errors: Vec<ErrorRecord>,
    infos: Vec<InfoRecord>,
    new_base_requested: bool,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            loads: Vec::new(),
            battery: Battery::default(),
            operating_mode: "AUTOMATIC".to_string(),
            position: None,
            velocity: Velocity::default(),
            driving: false,
            distance_since_last_node: None,
            errors: Vec::new(),
            infos: Vec::new(),
            new_base_requested: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusDump {
    pub loads: Vec<Load>,
    pub battery: Battery,
    pub operating_mode: String,
    pub position: Option<Position>,
    pub velocity: Velocity,
    pub driving: bool,
    pub distance_since_last_node: Option<f64>,
    pub errors: Vec<ErrorRecord>,
    pub infos: Vec<InfoRecord>,
    pub new_base_requested: bool,
}

pub struct StatusManager {
    inner: Mutex<Inner>,
}

impl Default for StatusManager {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl StatusManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_position(&self, position: Position) {
        self.inner.lock().await.position = Some(position);
    }

    pub async fn set_velocity(&self, velocity: Velocity) {
        self.inner.lock().await.velocity = velocity;
    }

    pub async fn set_driving(&self, driving: bool) {
        self.inner.lock().await.driving = driving;
    }

    pub async fn set_distance_since_last_node(&self, distance: Option<f64>) {
        self.inner.lock().await.distance_since_last_node = distance;
    }

    pub async fn reset_distance_since_last_node(&self) {
        self.inner.lock().await.distance_since_last_node = Some(0.0);
    }

    pub async fn set_battery(&self, battery: Battery) {
        self.inner.lock().await.battery = battery;
    }

    pub async fn set_operating_mode(&self, mode: impl Into<String>) {
        self.inner.lock().await.operating_mode = mode.into();
    }

    pub async fn set_new_base_requested(&self, requested: bool) {
        self.inner.lock().await.new_base_requested = requested;
    }

    /// Passes the mutable loads container to `f` under the lock, the
    /// way `order_manager.h`-adjacent status alterations work in the
    /// original (spec.md §4.4: "an `alter(fn)` primitive").
    pub async fn alter_loads(&self, f: impl FnOnce(&mut Vec<Load>)) {
        let mut g = self.inner.lock().await;
        f(&mut g.loads);
    }

    pub async fn alter_errors(&self, f: impl FnOnce(&mut Vec<ErrorRecord>)) {
        let mut g = self.inner.lock().await;
        f(&mut g.errors);
    }

    pub async fn alter_infos(&self, f: impl FnOnce(&mut Vec<InfoRecord>)) {
        let mut g = self.inner.lock().await;
        f(&mut g.infos);
    }

    pub async fn push_error(&self, error_type: impl Into<String>, description: impl Into<String>) {
        self.alter_errors(|errors| {
            errors.push(ErrorRecord {
                error_type: error_type.into(),
                error_level: ErrorLevel::Warning,
                error_references: Default::default(),
                error_description: description.into(),
            });
        })
        .await;
    }

    pub async fn dump(&self) -> StatusDump {
        let g = self.inner.lock().await;
        StatusDump {
            loads: g.loads.clone(),
            battery: g.battery,
            operating_mode: g.operating_mode.clone(),
            position: g.position.clone(),
            velocity: g.velocity,
            driving: g.driving,
            distance_since_last_node: g.distance_since_last_node,
            errors: g.errors.clone(),
            infos: g.infos.clone(),
            new_base_requested: g.new_base_requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn alter_loads_mutates_under_lock() {
        let sm = StatusManager::new();
        sm.alter_loads(|loads| {
            loads.push(Load {
                load_id: Some("l1".into()),
                load_type: None,
                load_position: None,
                weight: Some(12.5),
            });
        })
        .await;
        let dump = sm.dump().await;
        assert_eq!(dump.loads.len(), 1);
    }

    #[tokio::test]
    async fn reset_distance_resets_to_zero() {
        let sm = StatusManager::new();
        sm.set_distance_since_last_node(Some(4.2)).await;
        sm.reset_distance_since_last_node().await;
        assert_eq!(sm.dump().await.distance_since_last_node, Some(0.0));
    }
}
