//! Capability-interface ports (spec.md §6, design note in §9).
//!
//! The original C++ source models these as abstract base classes
//! (`NavigationEventHandler`, `QueryEventHandler`, ...). Rather than
//! inheritance, each port here is a plain async trait object the core
//! holds behind an `Arc<dyn Trait>` — the same shape the teacher uses
//! for its LLM client traits (`llm::traits`) and node executors.

pub mod simple;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Action, Edge, Node, SequenceId};
use crate::wire::{Connection, Factsheet, StateMessage, Visualization};

#[derive(Debug, Clone, PartialEq)]
pub struct PortError {
    pub error_type: String,
    pub error_description: String,
}

impl PortError {
    pub fn new(error_type: impl Into<String>, error_description: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            error_description: error_description.into(),
        }
    }
}

/// Where an action was declared: on a node, on an edge, or as an
/// instant action (spec.md §4.5, item 6).
#[derive(Debug, Clone, PartialEq)]
pub enum ActionContext {
    Node { node_id: String },
    Edge { edge_id: String },
    Instant,
}

/// One user-registered action declaration (spec.md §6).
#[async_trait]
pub trait ActionPort: Send + Sync {
    /// Does this declaration claim the action (by `action_type`)?
    fn matches(&self, action: &Action) -> bool;

    /// Validates the action's parameters in context. An empty error list
    /// accepts it; `parameters` is attached to the action's identity on
    /// success.
    async fn validate(
        &self,
        action: &Action,
        context: ActionContext,
    ) -> (Vec<PortError>, Option<HashMap<String, String>>);

    /// Prepares a running handle for a validated action.
    async fn prepare(
        &self,
        action: &Action,
        parameters: HashMap<String, String>,
    ) -> Result<Arc<dyn ActionHandle>>;
}

/// The callbacks the scheduler drives an action through once started
/// (spec.md §6: `prepare(...) -> callbacks{start,pause,resume,cancel}`).
#[async_trait]
pub trait ActionHandle: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn resume(&self) -> Result<()>;
    async fn cancel(&self) -> Result<()>;
}

/// Navigation notifications in both directions (spec.md §6).
#[async_trait]
pub trait NavigationPort: Send + Sync {
    async fn horizon_updated(&self, nodes: Vec<Node>, edges: Vec<Edge>);
    async fn base_increased(&self, nodes: Vec<Node>, edges: Vec<Edge>);
    async fn navigate_to_next_node(&self, node: Node, edge: Option<Edge>);
    async fn upcoming_segment(&self, first_seq: SequenceId, last_seq: SequenceId);
    async fn cancel(&self);
    async fn pause(&self);
    async fn resume(&self);
}

/// Queries the vehicle-specific adapter can answer (spec.md §6).
#[async_trait]
pub trait QueryPort: Send + Sync {
    async fn query_pauseable(&self) -> (Vec<PortError>, bool);
    async fn query_resumable(&self) -> (Vec<PortError>, bool);
    async fn query_accept_zone_set(&self, zone_set_id: &str) -> Vec<PortError>;
}

/// Default answers used when no query handler is installed (spec.md
/// §6: "Defaults configurable when no handler is installed").
pub struct DefaultQueryPort {
    pub pauseable: bool,
    pub resumable: bool,
    pub accept_all_zone_sets: bool,
}

impl Default for DefaultQueryPort {
    fn default() -> Self {
        Self {
            pauseable: true,
            resumable: true,
            accept_all_zone_sets: true,
        }
    }
}

#[async_trait]
impl QueryPort for DefaultQueryPort {
    async fn query_pauseable(&self) -> (Vec<PortError>, bool) {
        (Vec::new(), self.pauseable)
    }

    async fn query_resumable(&self) -> (Vec<PortError>, bool) {
        (Vec::new(), self.resumable)
    }

    async fn query_accept_zone_set(&self, zone_set_id: &str) -> Vec<PortError> {
        if self.accept_all_zone_sets {
            Vec::new()
        } else {
            vec![PortError::new(
                "zoneSetRejected",
                format!("zone set {zone_set_id} not accepted"),
            )]
        }
    }
}

/// The seam a real MQTT adapter sits behind (spec.md §1, §6): the core
/// never touches a socket, only hands finished wire messages to this
/// trait. Headers are filled from `Config`; this port only mints the
/// monotonic `headerId`.
#[async_trait]
pub trait MessageEgressPort: Send + Sync {
    async fn send_state(&self, state: StateMessage);
    async fn send_visualization(&self, visualization: Visualization);
    async fn send_connection(&self, connection: Connection);
    async fn send_factsheet(&self, factsheet: Factsheet);
    fn next_header_id(&self, message_kind: &str) -> u32;
}
