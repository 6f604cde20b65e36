//! Owns the live graph and action tables (spec.md §3, §4.3).
//!
//! Mutators are serialized by a single lock; readers snapshot under the
//! same lock — translated from `order_manager.h`'s `std::mutex` plus
//! `invalidLock` guard. Rust's `Mutex` makes the "wrong lock" check
//! moot: a `MutexGuard` can only ever come from this manager's own
//! mutex (see DESIGN.md).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::error::{Result, Vda5050Error};
use crate::model::{Action, ActionState, ActionStatus, Graph, SequenceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Idle,
    IdlePaused,
    Active,
    Pausing,
    Paused,
    Resuming,
    Canceling,
    Failed,
    Interrupting,
}

struct Inner {
    order_id: String,
    order_update_id: u32,
    last_node_id: String,
    last_node_sequence_id: SequenceId,
    graph: Option<Graph>,
    actions: HashMap<String, Action>,
    action_states: HashMap<String, ActionState>,
    status: OrderStatus,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            order_id: String::new(),
            order_update_id: 0,
            last_node_id: String::new(),
            last_node_sequence_id: 0,
            graph: None,
            actions: HashMap::new(),
            action_states: HashMap::new(),
            status: OrderStatus::Idle,
        }
    }
}

/// A snapshot of everything an outbound `State` needs from the order
/// manager, taken under one lock acquisition (spec.md §5: "every
/// observer of a state snapshot sees a consistent view").
#[derive(Debug, Clone)]
pub struct OrderDump {
    pub order_id: String,
    pub order_update_id: u32,
    pub last_node_id: String,
    pub last_node_sequence_id: SequenceId,
    pub nodes: Vec<crate::model::Node>,
    pub edges: Vec<crate::model::Edge>,
    pub action_states: Vec<ActionState>,
    pub order_status: OrderStatus,
}

pub struct OrderManager {
    inner: Mutex<Inner>,
}

impl Default for OrderManager {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl OrderManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_id(&self) -> (String, u32) {
        let g = self.inner.lock().await;
        (g.order_id.clone(), g.order_update_id)
    }

    pub async fn order_status(&self) -> OrderStatus {
        self.inner.lock().await.status
    }

    pub async fn set_order_status(&self, status: OrderStatus) {
        let mut g = self.inner.lock().await;
        info!(?status, "order status transition");
        g.status = status;
    }

    pub async fn has_graph(&self) -> bool {
        self.inner.lock().await.graph.is_some()
    }

    /// Adds a brand-new live action, emitting its `ActionState` in
    /// `WAITING`. Duplicate ids are rejected (spec.md §3 invariant,
    /// §4.3).
    pub async fn add_new_action(&self, action: Action) -> Result<()> {
        let mut g = self.inner.lock().await;
        Self::add_new_action_locked(&mut g, action)
    }

    fn add_new_action_locked(g: &mut Inner, action: Action) -> Result<()> {
        if g.actions.contains_key(&action.action_id) {
            return Err(Vda5050Error::InvalidArgument(format!(
                "action id {} already live",
                action.action_id
            )));
        }
        let state = ActionState::waiting(&action.action_id, &action.action_type);
        g.action_states.insert(action.action_id.clone(), state);
        g.actions.insert(action.action_id.clone(), action);
        Ok(())
    }

    pub async fn get_action(&self, action_id: &str) -> Result<Action> {
        self.try_get_action(action_id).await.ok_or_else(|| {
            Vda5050Error::InvalidArgument(format!("no such action id {action_id}"))
        })
    }

    pub async fn try_get_action(&self, action_id: &str) -> Option<Action> {
        self.inner.lock().await.actions.get(action_id).cloned()
    }

    pub async fn get_action_state(&self, action_id: &str) -> Result<ActionState> {
        self.try_get_action_state(action_id).await.ok_or_else(|| {
            Vda5050Error::InvalidArgument(format!("no such action id {action_id}"))
        })
    }

    pub async fn try_get_action_state(&self, action_id: &str) -> Option<ActionState> {
        self.inner
            .lock()
            .await
            .action_states
            .get(action_id)
            .cloned()
    }

    pub async fn set_action_status(
        &self,
        action_id: &str,
        status: ActionStatus,
        result_description: Option<String>,
    ) -> Result<()> {
        let mut g = self.inner.lock().await;
        let state = g.action_states.get_mut(action_id).ok_or_else(|| {
            Vda5050Error::InvalidArgument(format!("no such action id {action_id}"))
        })?;
        state
            .transition(status, result_description)
            .map_err(|e| Vda5050Error::InvalidState(e.to_string()))
    }

    /// Extends the current graph, registering any new actions it
    /// introduces. Returns the delta sequence range.
    pub async fn extend_graph(&self, extension: Graph) -> Result<(SequenceId, SequenceId)> {
        let mut g = self.inner.lock().await;
        let delta = if g.graph.is_some() {
            let graph = g.graph.as_mut().expect("checked above");
            graph.extend(extension.clone())?
        } else {
            let bounds = extension.bounds();
            g.graph = Some(extension.clone());
            bounds
        };
        for node in extension.nodes() {
            for action in &node.actions {
                let _ = Self::add_new_action_locked(&mut g, action.clone());
            }
        }
        for edge in extension.edges() {
            for action in &edge.actions {
                let _ = Self::add_new_action_locked(&mut g, action.clone());
            }
        }
        Ok(delta)
    }

    pub async fn replace_graph(&self, new_graph: Graph, order_id: &str) -> Result<()> {
        let mut g = self.inner.lock().await;
        g.order_id = order_id.to_string();
        for node in new_graph.nodes() {
            for action in &node.actions {
                let _ = Self::add_new_action_locked(&mut g, action.clone());
            }
        }
        for edge in new_graph.edges() {
            for action in &edge.actions {
                let _ = Self::add_new_action_locked(&mut g, action.clone());
            }
        }
        g.graph = Some(new_graph);
        Ok(())
    }

    pub async fn set_order_update_id(&self, update_id: u32) {
        self.inner.lock().await.order_update_id = update_id;
    }

    /// Records the AGV's new last-visited node and drops everything
    /// behind it — the node/edge pairs the AGV has already passed don't
    /// belong in the next `State`'s `nodeStates`/`edgeStates` (spec.md
    /// §8 scenario S3).
    pub async fn set_agv_last_node(&self, seq: SequenceId, node_id: &str) -> Result<()> {
        let mut g = self.inner.lock().await;
        let graph = g
            .graph
            .as_mut()
            .ok_or_else(|| Vda5050Error::InvalidArgument("no graph".into()))?;
        graph.set_agv_last_node(seq)?;
        graph.trim()?;
        g.last_node_sequence_id = seq;
        g.last_node_id = node_id.to_string();
        Ok(())
    }

    pub async fn last_node_sequence_id(&self) -> SequenceId {
        self.inner.lock().await.last_node_sequence_id
    }

    pub async fn clear_graph(&self) {
        self.inner.lock().await.graph = None;
    }

    pub async fn clear_actions(&self) {
        let mut g = self.inner.lock().await;
        g.actions.clear();
        g.action_states.clear();
    }

    /// Flips every `WAITING` action to `FAILED` (spec.md §4.3, used by
    /// cancellation).
    pub async fn cancel_waiting_actions(&self) {
        let mut g = self.inner.lock().await;
        for state in g.action_states.values_mut() {
            if state.status == ActionStatus::Waiting {
                let _ = state.transition(ActionStatus::Failed, Some("order canceled".into()));
            }
        }
    }

    pub async fn dump(&self) -> OrderDump {
        let g = self.inner.lock().await;
        Self::dump_locked(&g)
    }

    fn dump_locked(g: &MutexGuard<'_, Inner>) -> OrderDump {
        let (nodes, edges) = match &g.graph {
            Some(graph) => (
                graph.nodes().cloned().collect(),
                graph.edges().cloned().collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        OrderDump {
            order_id: g.order_id.clone(),
            order_update_id: g.order_update_id,
            last_node_id: g.last_node_id.clone(),
            last_node_sequence_id: g.last_node_sequence_id,
            nodes,
            edges,
            action_states: g.action_states.values().cloned().collect(),
            order_status: g.status,
        }
    }
}
