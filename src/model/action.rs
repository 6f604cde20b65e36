use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// NONE ≤ SOFT ≤ HARD: the ordering used by the interpreter to bump a
/// group's blocking-type ceiling as it collects actions (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockingType {
    None,
    Soft,
    Hard,
}

/// `action_id` is unique across all live actions (spec.md §3 invariant 2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub action_id: String,
    pub action_type: String,
    pub blocking_type: BlockingType,
    #[serde(default)]
    pub action_parameters: HashMap<String, String>,
}

/// The per-action state machine (spec.md §3): `WAITING` is the only
/// non-terminal state with more than one successor; `FINISHED` and
/// `FAILED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    Waiting,
    Initializing,
    Running,
    Paused,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionState {
    pub action_id: String,
    pub action_type: String,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_description: Option<String>,
}

impl ActionState {
    pub fn waiting(action_id: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            action_type: action_type.into(),
            status: ActionStatus::Waiting,
            result_description: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ActionStatus::Finished | ActionStatus::Failed)
    }

    /// Applies a transition, rejecting anything not allowed by the state
    /// machine in spec.md §3.
    pub fn transition(
        &mut self,
        next: ActionStatus,
        result_description: Option<String>,
    ) -> Result<(), StatusMachineError> {
        use ActionStatus::*;
        let allowed = match (self.status, next) {
            (Waiting, Initializing | Running | Failed | Paused) => true,
            (Initializing, Running | Failed | Paused) => true,
            (Running, Paused | Finished | Failed) => true,
            (Paused, Running | Finished | Failed) => true,
            (Finished, _) | (Failed, _) => false,
            _ => false,
        };
        if !allowed {
            return Err(StatusMachineError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if result_description.is_some() {
            self.result_description = result_description;
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("illegal action state transition {from:?} -> {to:?}")]
pub struct StatusMachineError {
    pub from: ActionStatus,
    pub to: ActionStatus,
}
