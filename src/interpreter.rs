//! Turns a validated order graph into a sequence of execution events
//! (spec.md §4.6).
//!
//! The original interpreter is a coroutine-shaped state machine
//! (`initial -> pre_node_action -> node_action -> ... -> done`). This
//! crate materializes the same walk eagerly into a `Vec<InterpreterEvent>`
//! instead of a true generator/stream — the scheduler consumes it in
//! order either way, and eager production keeps the state machine
//! testable without an async-generator dependency the teacher's stack
//! doesn't carry (see DESIGN.md).

use crate::model::{Action, BlockingType, Edge, Graph, GraphElement, Node, SequenceId};

#[derive(Debug, Clone, PartialEq)]
pub enum AttachedTo {
    Node,
    Edge,
    Instant,
}

/// One action plus the node or edge id it was declared on, so the
/// scheduler can build the right [`crate::ports::ActionContext`] even
/// when a group accumulates actions from more than one graph element
/// (spec.md §4.5 item 6). `owner_id` is unused when `attached_to` is
/// [`AttachedTo::Instant`].
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedAction {
    pub owner_id: String,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionGroup {
    pub actions: Vec<GroupedAction>,
    pub blocking_ceiling: BlockingType,
    pub attached_to: AttachedTo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterpreterEvent {
    NewAction(Action),
    YieldActionGroup(ActionGroup),
    YieldNavigationStep {
        goal: Node,
        via_edge: Option<Edge>,
        stop_at_goal: bool,
    },
    YieldGraphExtension(Graph),
    YieldGraphReplacement(Graph),
    YieldInstantActionGroup(ActionGroup),
    Done,
}

/// The subset of instant actions that short-circuit the interpreter and
/// install a tailored event control block directly (spec.md §2, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlInstantAction {
    CancelOrder,
    StartPause,
    StopPause,
    FactsheetRequest,
    StateRequest,
}

pub fn classify_instant_action(action: &Action) -> Option<ControlInstantAction> {
    match action.action_type.as_str() {
        "cancelOrder" => Some(ControlInstantAction::CancelOrder),
        "startPause" => Some(ControlInstantAction::StartPause),
        "stopPause" => Some(ControlInstantAction::StopPause),
        "factsheetRequest" => Some(ControlInstantAction::FactsheetRequest),
        "stateRequest" => Some(ControlInstantAction::StateRequest),
        _ => None,
    }
}

/// Bundles the remaining (non-control) instant actions into a single
/// interruption group the scheduler executes ahead of the normal queue.
pub fn interpret_instant_actions(actions: Vec<Action>) -> Option<InterpreterEvent> {
    let group: Vec<Action> = actions
        .into_iter()
        .filter(|a| classify_instant_action(a).is_none())
        .collect();
    if group.is_empty() {
        return None;
    }
    let ceiling = group
        .iter()
        .map(|a| a.blocking_type)
        .max()
        .unwrap_or(BlockingType::None);
    let actions = group
        .into_iter()
        .map(|action| GroupedAction {
            owner_id: String::new(),
            action,
        })
        .collect();
    Some(InterpreterEvent::YieldInstantActionGroup(ActionGroup {
        actions,
        blocking_ceiling: ceiling,
        attached_to: AttachedTo::Instant,
    }))
}

/// Walks `graph`'s base (and, once, the first unreleased element) from
/// `start_after` to the last base node, in sequence-id order.
///
/// `known_action_ids` lets the interpreter skip `NewAction` events for
/// actions the order manager already knows about (e.g. on an idempotent
/// re-send).
pub fn interpret(
    graph: &Graph,
    start_after: Option<SequenceId>,
    known_action_ids: &std::collections::HashSet<String>,
) -> Vec<InterpreterEvent> {
    let mut events = Vec::new();
    let mut pending: Option<ActionGroup> = None;
    let mut emitted_extension = false;

    let flush = |pending: &mut Option<ActionGroup>, events: &mut Vec<InterpreterEvent>| {
        if let Some(group) = pending.take() {
            if !group.actions.is_empty() {
                events.push(InterpreterEvent::YieldActionGroup(group));
            }
        }
    };

    let mut seqs: Vec<SequenceId> = graph.iter().map(|(seq, _)| *seq).collect();
    seqs.sort_unstable();

    for seq in seqs {
        if let Some(after) = start_after {
            if seq <= after {
                continue;
            }
        }
        let element = graph.at(seq).expect("sequence id came from this graph");

        let released = match element {
            GraphElement::Node(n) => n.released,
            GraphElement::Edge(e) => e.released,
        };
        if !released && !emitted_extension {
            emitted_extension = true;
            events.push(InterpreterEvent::YieldGraphExtension(graph.clone()));
        }

        match element {
            GraphElement::Node(node) => {
                for action in &node.actions {
                    if !known_action_ids.contains(&action.action_id) {
                        events.push(InterpreterEvent::NewAction(action.clone()));
                    }
                }
                let ceiling = node
                    .actions
                    .iter()
                    .map(|a| a.blocking_type)
                    .max()
                    .unwrap_or(BlockingType::None);
                let group = pending.get_or_insert_with(|| ActionGroup {
                    actions: Vec::new(),
                    blocking_ceiling: BlockingType::None,
                    attached_to: AttachedTo::Node,
                });
                group
                    .actions
                    .extend(node.actions.iter().cloned().map(|action| GroupedAction {
                        owner_id: node.node_id.clone(),
                        action,
                    }));
                group.blocking_ceiling = group.blocking_ceiling.max(ceiling);

                if group.blocking_ceiling == BlockingType::Hard {
                    flush(&mut pending, &mut events);
                }
            }
            GraphElement::Edge(edge) => {
                flush(&mut pending, &mut events);

                for action in &edge.actions {
                    if !known_action_ids.contains(&action.action_id) {
                        events.push(InterpreterEvent::NewAction(action.clone()));
                    }
                }

                let goal_seq = edge.sequence_id + 1;
                let goal_node = graph
                    .at(goal_seq)
                    .ok()
                    .and_then(|el| el.as_node())
                    .cloned();
                let ceiling = edge
                    .actions
                    .iter()
                    .map(|a| a.blocking_type)
                    .max()
                    .unwrap_or(BlockingType::None);

                let stop_at_goal = ceiling == BlockingType::Hard
                    || graph
                        .base_bounds()
                        .map(|(_, last)| goal_seq == last)
                        .unwrap_or(false);

                if let Some(goal) = goal_node {
                    events.push(InterpreterEvent::YieldNavigationStep {
                        goal,
                        via_edge: Some(edge.clone()),
                        stop_at_goal,
                    });
                }
                if !edge.actions.is_empty() {
                    let actions = edge
                        .actions
                        .iter()
                        .cloned()
                        .map(|action| GroupedAction {
                            owner_id: edge.edge_id.clone(),
                            action,
                        })
                        .collect();
                    events.push(InterpreterEvent::YieldActionGroup(ActionGroup {
                        actions,
                        blocking_ceiling: ceiling,
                        attached_to: AttachedTo::Edge,
                    }));
                }
            }
        }
    }

    flush(&mut pending, &mut events);
    events.push(InterpreterEvent::Done);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn s1_minimal_order_emits_only_done() {
        let graph = Graph::new(vec![GraphElement::Node(Node::new("n0", 0, true))]).unwrap();
        let events = interpret(&graph, None, &HashSet::new());
        assert_eq!(events, vec![InterpreterEvent::Done]);
    }

    #[test]
    fn hard_action_flushes_before_motion() {
        let mut node = Node::new("n0", 0, true);
        node.actions.push(Action {
            action_id: "a1".into(),
            action_type: "wait".into(),
            blocking_type: BlockingType::Hard,
            action_parameters: Default::default(),
        });
        let edge = Edge::new("e1", 1, true, "n0", "n2");
        let node2 = Node::new("n2", 2, true);
        let graph = Graph::new(vec![
            GraphElement::Node(node),
            GraphElement::Edge(edge),
            GraphElement::Node(node2),
        ])
        .unwrap();

        let events = interpret(&graph, None, &HashSet::new());
        assert!(matches!(events[0], InterpreterEvent::NewAction(_)));
        assert!(matches!(events[1], InterpreterEvent::YieldActionGroup(_)));
        assert!(matches!(
            events[2],
            InterpreterEvent::YieldNavigationStep { .. }
        ));
    }

    #[test]
    fn unreleased_element_yields_graph_extension_once() {
        let n0 = Node::new("n0", 0, true);
        let e1 = Edge::new("e1", 1, false, "n0", "n2");
        let n2 = Node::new("n2", 2, false);
        let graph = Graph::new(vec![
            GraphElement::Node(n0),
            GraphElement::Edge(e1),
            GraphElement::Node(n2),
        ])
        .unwrap();
        let events = interpret(&graph, None, &HashSet::new());
        let extensions = events
            .iter()
            .filter(|e| matches!(e, InterpreterEvent::YieldGraphExtension(_)))
            .count();
        assert_eq!(extensions, 1);
    }
}
