//! Synchronous order/instant-action validation (spec.md §4.5).
//!
//! Validation never short-circuits: every check below runs and any
//! errors it finds are appended to one flat list. A non-empty list
//! rejects the whole message; the caller is responsible for surfacing
//! it as `Error` records on the next `State` (spec.md §7).

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::model::{self, Action, Edge, Graph, GraphElement, Node, SequenceId};
use crate::order_manager::{OrderManager, OrderStatus};
use crate::ports::{ActionContext, ActionPort, PortError, QueryPort};
use crate::wire::{ErrorLevel, ErrorRecord, InstantActions, OrderMessage};

/// The outcome of a successful order validation: the graph ready for
/// `OrderManager::extend_graph`/`replace_graph`, plus per-action
/// parsed parameters attached during action-port validation.
#[derive(Debug, Clone)]
pub struct ValidOrder {
    pub order_id: String,
    pub order_update_id: u32,
    pub graph: Graph,
    pub is_append: bool,
    pub action_parameters: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Clone)]
pub struct ValidInstantActions {
    pub actions: Vec<Action>,
    pub action_parameters: HashMap<String, HashMap<String, String>>,
}

fn error(error_type: &str, description: impl Into<String>) -> ErrorRecord {
    ErrorRecord {
        error_type: error_type.to_string(),
        error_level: ErrorLevel::Warning,
        error_references: HashMap::new(),
        error_description: description.into(),
    }
}

pub struct Validator {
    config: Config,
}

impl Validator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn check_header(&self, manufacturer: &str, serial_number: &str, version: &str) -> Vec<ErrorRecord> {
        let mut errors = Vec::new();
        if manufacturer != self.config.manufacturer {
            errors.push(error(
                "headerError",
                format!("unexpected manufacturer {manufacturer}"),
            ));
        }
        if serial_number != self.config.serial_number {
            errors.push(error(
                "headerError",
                format!("unexpected serial number {serial_number}"),
            ));
        }
        if !self.config.compatible_versions.iter().any(|v| v == version) {
            errors.push(error(
                "headerError",
                format!("protocol version {version} is not compatible"),
            ));
        }
        errors
    }

    /// Nodes even, edges odd, ids dense over `[first, last]`.
    fn check_dense_sequence(&self, ids: &[SequenceId]) -> Vec<ErrorRecord> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        let mut errors = Vec::new();
        for window in sorted.windows(2) {
            if window[1] != window[0] + 1 {
                errors.push(error(
                    "orderError",
                    format!(
                        "sequence ids are not dense: gap between {} and {}",
                        window[0], window[1]
                    ),
                ));
            }
        }
        errors
    }

    async fn check_actions_unique_and_validated(
        &self,
        actions: &[(Action, ActionContext)],
        order_manager: &OrderManager,
        action_ports: &[Arc<dyn ActionPort>],
    ) -> (Vec<ErrorRecord>, HashMap<String, HashMap<String, String>>) {
        let mut errors = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut parameters = HashMap::new();

        for (action, context) in actions {
            if !seen.insert(action.action_id.clone()) {
                errors.push(error(
                    "actionError",
                    format!("duplicate action id {} in this message", action.action_id),
                ));
                continue;
            }
            if order_manager.try_get_action(&action.action_id).await.is_some() {
                errors.push(error(
                    "actionError",
                    format!("action id {} already live", action.action_id),
                ));
                continue;
            }

            let handler = action_ports.iter().find(|p| p.matches(action));
            match handler {
                None => errors.push(error(
                    "unknown_action_type",
                    format!("no handler declared for action type {}", action.action_type),
                )),
                Some(handler) => {
                    let (handler_errors, params) =
                        handler.validate(action, context.clone()).await;
                    for e in handler_errors {
                        errors.push(error("actionError", e.error_description));
                    }
                    if let Some(params) = params {
                        parameters.insert(action.action_id.clone(), params);
                    }
                }
            }
        }
        (errors, parameters)
    }

    /// Validates an incoming `order` message end to end.
    pub async fn validate_order(
        &self,
        order: &OrderMessage,
        order_manager: &OrderManager,
        action_ports: &[Arc<dyn ActionPort>],
        query_port: &dyn QueryPort,
    ) -> (Vec<ErrorRecord>, Option<ValidOrder>) {
        let mut errors = self.check_header(
            &order.header.manufacturer,
            &order.header.serial_number,
            &order.header.version,
        );

        let (current_order_id, current_update_id) = order_manager.order_id().await;
        let current_status = order_manager.order_status().await;
        let is_same_order = order.order_id == current_order_id && !current_order_id.is_empty();

        if is_same_order && order.order_update_id < current_update_id {
            errors.push(error(
                "orderUpdateError",
                "update id is lower than the current order's update id",
            ));
        }
        if !is_same_order
            && !current_order_id.is_empty()
            && current_status != OrderStatus::Idle
            && current_status != OrderStatus::IdlePaused
        {
            errors.push(error(
                "orderError",
                "a new order id was received while the current order is not idle",
            ));
        }

        let mut all_ids: Vec<SequenceId> =
            order.nodes.iter().map(|n| n.sequence_id).collect();
        all_ids.extend(order.edges.iter().map(|e| e.sequence_id));
        errors.extend(self.check_dense_sequence(&all_ids));

        for n in &order.nodes {
            if !model::is_node_seq(n.sequence_id) {
                errors.push(error(
                    "orderError",
                    format!("node sequence id {} must be even", n.sequence_id),
                ));
            }
        }
        for e in &order.edges {
            if !model::is_edge_seq(e.sequence_id) {
                errors.push(error(
                    "orderError",
                    format!("edge sequence id {} must be odd", e.sequence_id),
                ));
            }
        }

        let first_seq = order.nodes.iter().map(|n| n.sequence_id).min();
        let is_append = match first_seq {
            Some(first) if order_manager.has_graph().await => {
                let last_base = order_manager.last_node_sequence_id().await;
                first == last_base
            }
            _ => false,
        };
        if !is_append {
            match first_seq {
                Some(0) => {
                    if current_status != OrderStatus::Idle
                        && current_status != OrderStatus::IdlePaused
                        && !current_order_id.is_empty()
                        && !is_same_order
                    {
                        errors.push(error(
                            "orderError",
                            "replacing an order requires the current order to be idle",
                        ));
                    }
                }
                Some(other) => errors.push(error(
                    "orderUpdateError",
                    format!(
                        "first node sequence id {other} does not stitch the current base and is not 0"
                    ),
                )),
                None => errors.push(error("orderError", "order has no nodes")),
            }
        }

        let mut action_tuples: Vec<(Action, ActionContext)> = Vec::new();
        for n in &order.nodes {
            for a in &n.actions {
                action_tuples.push((
                    a.clone(),
                    ActionContext::Node {
                        node_id: n.node_id.clone(),
                    },
                ));
            }
        }
        for e in &order.edges {
            for a in &e.actions {
                action_tuples.push((
                    a.clone(),
                    ActionContext::Edge {
                        edge_id: e.edge_id.clone(),
                    },
                ));
            }
        }
        let (action_errors, action_parameters) = self
            .check_actions_unique_and_validated(&action_tuples, order_manager, action_ports)
            .await;
        errors.extend(action_errors);

        if let Some(zone_set_id) = &order.zone_set_id {
            let zone_errors = query_port.query_accept_zone_set(zone_set_id).await;
            errors.extend(
                zone_errors
                    .into_iter()
                    .map(|e| error("orderError", e.error_description)),
            );
        }

        if !errors.is_empty() {
            return (errors, None);
        }

        let elements: Vec<GraphElement> = order
            .nodes
            .iter()
            .map(|n| {
                GraphElement::Node(Node {
                    node_id: n.node_id.clone(),
                    sequence_id: n.sequence_id,
                    released: n.released,
                    node_position: n.node_position.as_ref().map(|p| model::NodePosition {
                        x: p.x,
                        y: p.y,
                        theta: p.theta,
                        map_id: p.map_id.clone(),
                        allowed_deviation_xy: p.allowed_deviation_xy,
                        allowed_deviation_theta: p.allowed_deviation_theta,
                    }),
                    actions: n.actions.clone(),
                })
            })
            .chain(order.edges.iter().map(|e| {
                GraphElement::Edge(Edge {
                    edge_id: e.edge_id.clone(),
                    sequence_id: e.sequence_id,
                    released: e.released,
                    start_node_id: e.start_node_id.clone(),
                    end_node_id: e.end_node_id.clone(),
                    trajectory: e.trajectory.clone(),
                    actions: e.actions.clone(),
                })
            }))
            .collect();

        match Graph::new(elements) {
            Ok(graph) => (
                Vec::new(),
                Some(ValidOrder {
                    order_id: order.order_id.clone(),
                    order_update_id: order.order_update_id,
                    graph,
                    is_append,
                    action_parameters,
                }),
            ),
            Err(e) => (vec![error("orderError", e.to_string())], None),
        }
    }

    /// Validates a batch of instant actions. Each instant action is
    /// judged individually — other actions in the same batch proceed
    /// even if one is rejected (spec.md §7).
    pub async fn validate_instant_actions(
        &self,
        instant_actions: &InstantActions,
        order_manager: &OrderManager,
        action_ports: &[Arc<dyn ActionPort>],
    ) -> (Vec<ErrorRecord>, ValidInstantActions) {
        let mut header_errors = self.check_header(
            &instant_actions.header.manufacturer,
            &instant_actions.header.serial_number,
            &instant_actions.header.version,
        );

        let mut accepted = Vec::new();
        let mut parameters = HashMap::new();
        let mut errors = Vec::new();

        for action in &instant_actions.actions {
            let (action_errors, action_params) = self
                .check_actions_unique_and_validated(
                    &[(action.clone(), ActionContext::Instant)],
                    order_manager,
                    action_ports,
                )
                .await;
            if action_errors.is_empty() {
                if let Some(params) = action_params.get(&action.action_id) {
                    parameters.insert(action.action_id.clone(), params.clone());
                }
                accepted.push(action.clone());
            } else {
                errors.extend(action_errors);
            }
        }

        header_errors.extend(errors);
        (
            header_errors,
            ValidInstantActions {
                actions: accepted,
                action_parameters: parameters,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::DefaultQueryPort;
    use crate::wire::Header;
    use chrono::Utc;

    fn header(config: &Config) -> Header {
        Header {
            header_id: 1,
            timestamp: Utc::now(),
            version: config.compatible_versions[0].clone(),
            manufacturer: config.manufacturer.clone(),
            serial_number: config.serial_number.clone(),
        }
    }

    #[tokio::test]
    async fn s1_minimal_order_is_accepted() {
        let config = Config::default();
        let validator = Validator::new(config.clone());
        let om = OrderManager::new();
        let query = DefaultQueryPort::default();

        let order = OrderMessage {
            header: header(&config),
            order_id: "o1".into(),
            order_update_id: 0,
            zone_set_id: None,
            nodes: vec![crate::wire::order::NodeWire {
                node_id: "n0".into(),
                sequence_id: 0,
                released: true,
                node_position: Some(crate::wire::order::NodePositionWire {
                    x: 0.0,
                    y: 0.0,
                    theta: Some(0.0),
                    map_id: "m".into(),
                    allowed_deviation_xy: None,
                    allowed_deviation_theta: None,
                }),
                actions: Vec::new(),
            }],
            edges: Vec::new(),
        };

        let (errors, valid) = validator
            .validate_order(&order, &om, &[], &query)
            .await;
        assert!(errors.is_empty(), "{errors:?}");
        assert!(valid.is_some());
    }

    #[tokio::test]
    async fn s6_bad_seam_is_rejected() {
        let config = Config::default();
        let validator = Validator::new(config.clone());
        let om = OrderManager::new();
        let query = DefaultQueryPort::default();

        let graph = Graph::new(vec![GraphElement::Node(Node::new("n0", 0, true))]).unwrap();
        om.replace_graph(graph, "o1").await.unwrap();
        om.set_agv_last_node(0, "n0").await.unwrap();

        let order = OrderMessage {
            header: header(&config),
            order_id: "o1".into(),
            order_update_id: 1,
            zone_set_id: None,
            nodes: vec![crate::wire::order::NodeWire {
                node_id: "n4".into(),
                sequence_id: 4,
                released: true,
                node_position: None,
                actions: Vec::new(),
            }],
            edges: Vec::new(),
        };

        let (errors, valid) = validator
            .validate_order(&order, &om, &[], &query)
            .await;
        assert!(!errors.is_empty());
        assert!(valid.is_none());
        assert!(errors.iter().any(|e| e.error_type == "orderUpdateError"));
    }
}
