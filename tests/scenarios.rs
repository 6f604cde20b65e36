//! End-to-end scenarios driven through the public [`vda5050_core::Instance`]
//! API (spec.md §8). Literal ids/positions match those scenarios verbatim.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use vda5050_core::config::Config;
use vda5050_core::model::{Action, ActionStatus, BlockingType, Edge, Node};
use vda5050_core::order_manager::OrderStatus;
use vda5050_core::ports::{
    ActionContext, ActionHandle, ActionPort, DefaultQueryPort, MessageEgressPort, PortError,
};
use vda5050_core::wire::order::{EdgeWire, NodePositionWire, NodeWire};
use vda5050_core::wire::{Connection, Factsheet, Header, InstantActions, OrderMessage, StateMessage, Visualization};
use vda5050_core::Instance;

struct NoopHandle;
#[async_trait]
impl ActionHandle for NoopHandle {
    async fn start(&self) -> vda5050_core::error::Result<()> {
        Ok(())
    }
    async fn pause(&self) -> vda5050_core::error::Result<()> {
        Ok(())
    }
    async fn resume(&self) -> vda5050_core::error::Result<()> {
        Ok(())
    }
    async fn cancel(&self) -> vda5050_core::error::Result<()> {
        Ok(())
    }
}

/// Accepts any `wait` action and otherwise rejects.
struct WaitActionPort;
#[async_trait]
impl ActionPort for WaitActionPort {
    fn matches(&self, action: &Action) -> bool {
        action.action_type == "wait"
    }
    async fn validate(
        &self,
        _action: &Action,
        _context: ActionContext,
    ) -> (Vec<PortError>, Option<HashMap<String, String>>) {
        (Vec::new(), Some(HashMap::new()))
    }
    async fn prepare(
        &self,
        _action: &Action,
        _parameters: HashMap<String, String>,
    ) -> vda5050_core::error::Result<Arc<dyn ActionHandle>> {
        Ok(Arc::new(NoopHandle))
    }
}

#[derive(Default)]
struct RecordingNavigation {
    navigate_calls: Mutex<Vec<(String, Option<String>)>>,
}
#[async_trait]
impl vda5050_core::ports::NavigationPort for RecordingNavigation {
    async fn horizon_updated(&self, _nodes: Vec<Node>, _edges: Vec<Edge>) {}
    async fn base_increased(&self, _nodes: Vec<Node>, _edges: Vec<Edge>) {}
    async fn navigate_to_next_node(&self, node: Node, edge: Option<Edge>) {
        self.navigate_calls
            .lock()
            .unwrap()
            .push((node.node_id, edge.map(|e| e.edge_id)));
    }
    async fn upcoming_segment(&self, _first_seq: u32, _last_seq: u32) {}
    async fn cancel(&self) {}
    async fn pause(&self) {}
    async fn resume(&self) {}
}

#[derive(Default)]
struct RecordingEgress {
    states: Mutex<Vec<StateMessage>>,
    next_id: std::sync::atomic::AtomicU32,
}
#[async_trait]
impl MessageEgressPort for RecordingEgress {
    async fn send_state(&self, state: StateMessage) {
        self.states.lock().unwrap().push(state);
    }
    async fn send_visualization(&self, _visualization: Visualization) {}
    async fn send_connection(&self, _connection: Connection) {}
    async fn send_factsheet(&self, _factsheet: Factsheet) {}
    fn next_header_id(&self, _message_kind: &str) -> u32 {
        self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}

fn header(config: &Config, order_id_hint: u32) -> Header {
    Header {
        header_id: order_id_hint,
        timestamp: Utc::now(),
        version: config.compatible_versions[0].clone(),
        manufacturer: config.manufacturer.clone(),
        serial_number: config.serial_number.clone(),
    }
}

fn minimal_order(config: &Config) -> OrderMessage {
    OrderMessage {
        header: header(config, 0),
        order_id: "o1".into(),
        order_update_id: 0,
        zone_set_id: None,
        nodes: vec![NodeWire {
            node_id: "n0".into(),
            sequence_id: 0,
            released: true,
            node_position: Some(NodePositionWire {
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
    }
}

async fn wait_until<F, Fut>(mut predicate: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if predicate().await {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

fn new_instance() -> (Arc<Instance>, Arc<RecordingNavigation>, Arc<RecordingEgress>) {
    let config = Config::default();
    let navigation = Arc::new(RecordingNavigation::default());
    let egress = Arc::new(RecordingEgress::default());
    let instance = Instance::new(
        config,
        Arc::new(WaitActionPort),
        navigation.clone(),
        Arc::new(DefaultQueryPort::default()),
        egress.clone(),
    );
    (instance, navigation, egress)
}

#[tokio::test]
async fn s1_minimal_order_completes_idle_with_no_scheduler_work() {
    let (instance, navigation, _egress) = new_instance();
    let config = instance.config().clone();

    let errors = instance.submit_order(minimal_order(&config)).await;
    assert!(errors.is_empty(), "{errors:?}");

    wait_until(|| async { instance.order_manager().order_status().await == OrderStatus::Idle }).await;

    assert!(navigation.navigate_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn s2_duplicate_update_is_a_no_op() {
    let (instance, _navigation, egress) = new_instance();
    let config = instance.config().clone();

    let errors = instance.submit_order(minimal_order(&config)).await;
    assert!(errors.is_empty());
    wait_until(|| async { instance.order_manager().order_status().await == OrderStatus::Idle }).await;

    let states_before = egress.states.lock().unwrap().len();
    let errors = instance.submit_order(minimal_order(&config)).await;
    assert!(errors.is_empty(), "identical resend should be accepted, not erred: {errors:?}");
    wait_until(|| async { instance.order_manager().order_status().await == OrderStatus::Idle }).await;
    // A resend still nudges a state publish (it's a legitimate new
    // submission), but it must not error or run the scheduler twice over
    // stale events.
    assert!(egress.states.lock().unwrap().len() >= states_before);
}

#[tokio::test]
async fn s3_stitched_extension_navigates_and_trims_the_passed_node() {
    let (instance, navigation, _egress) = new_instance();
    let config = instance.config().clone();

    instance.submit_order(minimal_order(&config)).await;
    wait_until(|| async { instance.order_manager().order_status().await == OrderStatus::Idle }).await;

    let extension = OrderMessage {
        header: header(&config, 1),
        order_id: "o1".into(),
        order_update_id: 1,
        zone_set_id: None,
        nodes: vec![
            NodeWire {
                node_id: "n0".into(),
                sequence_id: 0,
                released: true,
                node_position: None,
                actions: Vec::new(),
            },
            NodeWire {
                node_id: "n2".into(),
                sequence_id: 2,
                released: true,
                node_position: Some(NodePositionWire {
                    x: 1.0,
                    y: 0.0,
                    theta: Some(0.0),
                    map_id: "m".into(),
                    allowed_deviation_xy: Some(0.5),
                    allowed_deviation_theta: None,
                }),
                actions: Vec::new(),
            },
        ],
        edges: vec![EdgeWire {
            edge_id: "e1".into(),
            sequence_id: 1,
            released: true,
            start_node_id: "n0".into(),
            end_node_id: "n2".into(),
            trajectory: None,
            actions: Vec::new(),
        }],
    };

    let errors = instance.submit_order(extension).await;
    assert!(errors.is_empty(), "{errors:?}");

    wait_until(|| async { !navigation.navigate_calls.lock().unwrap().is_empty() }).await;
    assert_eq!(
        navigation.navigate_calls.lock().unwrap()[0],
        ("n2".to_string(), Some("e1".to_string()))
    );

    instance.report_navigation_finished(2);

    wait_until(|| async { instance.order_manager().order_status().await == OrderStatus::Idle }).await;

    let dump = instance.dump_order().await;
    assert_eq!(dump.last_node_sequence_id, 2);
    assert!(
        !dump.nodes.iter().any(|n| n.node_id == "n0"),
        "the passed node must be trimmed from nodeStates"
    );
}

#[tokio::test]
async fn s4_hard_blocking_action_gates_navigation() {
    let (instance, navigation, _egress) = new_instance();
    let config = instance.config().clone();

    let order = OrderMessage {
        header: header(&config, 0),
        order_id: "o1".into(),
        order_update_id: 0,
        zone_set_id: None,
        nodes: vec![NodeWire {
            node_id: "n0".into(),
            sequence_id: 0,
            released: true,
            node_position: None,
            actions: vec![Action {
                action_id: "a1".into(),
                action_type: "wait".into(),
                blocking_type: BlockingType::Hard,
                action_parameters: HashMap::new(),
            }],
        }],
        edges: Vec::new(),
    };

    let errors = instance.submit_order(order).await;
    assert!(errors.is_empty(), "{errors:?}");

    wait_until(|| async {
        instance
            .order_manager()
            .get_action_state("a1")
            .await
            .map(|s| s.status == ActionStatus::Running)
            .unwrap_or(false)
    })
    .await;

    assert!(
        navigation.navigate_calls.lock().unwrap().is_empty(),
        "no navigation may start before the HARD action finishes"
    );

    instance.report_action_finished("a1", true, None).await;

    wait_until(|| async {
        instance
            .order_manager()
            .get_action_state("a1")
            .await
            .map(|s| s.status == ActionStatus::Finished)
            .unwrap_or(false)
    })
    .await;
    wait_until(|| async { instance.order_manager().order_status().await == OrderStatus::Idle }).await;
}

#[tokio::test]
async fn s5_cancel_order_while_active_clears_the_graph() {
    let (instance, navigation, _egress) = new_instance();
    let config = instance.config().clone();

    instance.submit_order(minimal_order(&config)).await;
    wait_until(|| async { instance.order_manager().order_status().await == OrderStatus::Idle }).await;

    // n2 carries a HARD action the test never completes, so the order
    // is still genuinely active (blocked in the scheduler) when the
    // cancel below arrives — not already idle.
    let extension = OrderMessage {
        header: header(&config, 1),
        order_id: "o1".into(),
        order_update_id: 1,
        zone_set_id: None,
        nodes: vec![
            NodeWire {
                node_id: "n0".into(),
                sequence_id: 0,
                released: true,
                node_position: None,
                actions: Vec::new(),
            },
            NodeWire {
                node_id: "n2".into(),
                sequence_id: 2,
                released: true,
                node_position: None,
                actions: vec![Action {
                    action_id: "a2".into(),
                    action_type: "wait".into(),
                    blocking_type: BlockingType::Hard,
                    action_parameters: HashMap::new(),
                }],
            },
        ],
        edges: vec![EdgeWire {
            edge_id: "e1".into(),
            sequence_id: 1,
            released: true,
            start_node_id: "n0".into(),
            end_node_id: "n2".into(),
            trajectory: None,
            actions: Vec::new(),
        }],
    };
    instance.submit_order(extension).await;
    wait_until(|| async { !navigation.navigate_calls.lock().unwrap().is_empty() }).await;
    instance.report_navigation_finished(2);

    // Reached seq 2; the scheduler is now blocked on a2's HARD ceiling.
    wait_until(|| async {
        instance
            .order_manager()
            .get_action_state("a2")
            .await
            .map(|s| s.status == ActionStatus::Running)
            .unwrap_or(false)
    })
    .await;

    // A second, not-yet-started action: force-failed on cancel.
    let _ = instance
        .order_manager()
        .add_new_action(Action {
            action_id: "pending".into(),
            action_type: "wait".into(),
            blocking_type: BlockingType::None,
            action_parameters: HashMap::new(),
        })
        .await;

    let cancel = InstantActions {
        header: header(&config, 2),
        actions: vec![Action {
            action_id: "c1".into(),
            action_type: "cancelOrder".into(),
            blocking_type: BlockingType::Hard,
            action_parameters: HashMap::new(),
        }],
    };
    let errors = instance.submit_instant_actions(cancel).await;
    assert!(errors.is_empty(), "{errors:?}");

    wait_until(|| async {
        instance
            .order_manager()
            .get_action_state("pending")
            .await
            .map(|s| s.status == ActionStatus::Failed)
            .unwrap_or(false)
    })
    .await;
    wait_until(|| async {
        instance
            .order_manager()
            .get_action_state("c1")
            .await
            .map(|s| s.status == ActionStatus::Finished)
            .unwrap_or(false)
    })
    .await;
    wait_until(|| async { !instance.order_manager().has_graph().await }).await;
}

#[tokio::test]
async fn s6_bad_seam_is_rejected_with_no_state_change() {
    let (instance, _navigation, _egress) = new_instance();
    let config = instance.config().clone();

    instance.submit_order(minimal_order(&config)).await;
    wait_until(|| async { instance.order_manager().order_status().await == OrderStatus::Idle }).await;

    let bad = OrderMessage {
        header: header(&config, 1),
        order_id: "o1".into(),
        order_update_id: 1,
        zone_set_id: None,
        nodes: vec![NodeWire {
            node_id: "n4".into(),
            sequence_id: 4,
            released: true,
            node_position: None,
            actions: Vec::new(),
        }],
        edges: Vec::new(),
    };
    let errors = instance.submit_order(bad).await;
    assert!(!errors.is_empty());
    assert!(errors.iter().any(|e| e.error_type == "orderUpdateError"));

    let dump = instance.dump_order().await;
    assert_eq!(dump.last_node_sequence_id, 0);
    assert_eq!(dump.order_update_id, 0);
}
