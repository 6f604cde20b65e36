//! An AGV-side VDA 5050 order-execution engine.
//!
//! This crate implements the vehicle side of the VDA 5050 fleet-master
//! protocol: it accepts `order` and `instantActions` messages, walks
//! their node/edge graphs to completion against a small set of
//! capability-interface ports (actions, navigation, queries, message
//! egress), and publishes `state`/`visualization`/`connection` back out.
//! It never touches MQTT or any other transport directly — that's the
//! job of whatever implements [`ports::MessageEgressPort`].
//!
//! The pieces, roughly in the order a message flows through them:
//! [`validator`] accepts or rejects incoming messages, [`order_manager`]
//! and [`status_manager`] hold the live state, [`interpreter`] turns an
//! accepted graph into a sequence of execution events, [`scheduler`]
//! drives those events against the ports, and [`aggregator`] assembles
//! outbound messages on a throttled cadence ([`throttle`]).

pub mod aggregator;
pub mod bus;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod model;
pub mod order_manager;
pub mod ports;
pub mod scheduler;
pub mod status_manager;
pub mod throttle;
pub mod validator;
pub mod wire;

use std::sync::Arc;

use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::config::Config;
use crate::order_manager::{OrderDump, OrderManager, OrderStatus};
use crate::ports::{ActionPort, MessageEgressPort, NavigationPort, QueryPort};
use crate::scheduler::Scheduler;
use crate::status_manager::StatusManager;
use crate::throttle::UpdateUrgency;
use crate::validator::Validator;
use crate::wire::{ErrorLevel, ErrorRecord, InstantActions, OrderMessage};

/// The single long-lived handle a caller holds for one AGV (spec.md §9
/// design note: "a single explicit handle, not a global accessor" — the
/// original's `vda5050pp::core::Instance::ref()` singleton is
/// deliberately not reproduced here).
pub struct Instance {
    config: Config,
    validator: Validator,
    order_manager: Arc<OrderManager>,
    status_manager: Arc<StatusManager>,
    action_port: Arc<dyn ActionPort>,
    navigation_port: Arc<dyn NavigationPort>,
    query_port: Arc<dyn QueryPort>,
    scheduler: Arc<Scheduler>,
    aggregator: Arc<Aggregator>,
}

impl Instance {
    pub fn new(
        config: Config,
        action_port: Arc<dyn ActionPort>,
        navigation_port: Arc<dyn NavigationPort>,
        query_port: Arc<dyn QueryPort>,
        egress_port: Arc<dyn MessageEgressPort>,
    ) -> Arc<Self> {
        let order_manager = Arc::new(OrderManager::new());
        let status_manager = Arc::new(StatusManager::new());
        let events = bus::EventBus::new(bus::DispatchMode::Asynchronous);

        let scheduler = Arc::new(Scheduler::new(
            order_manager.clone(),
            status_manager.clone(),
            action_port.clone(),
            navigation_port.clone(),
            query_port.clone(),
            events.clone(),
        ));

        let aggregator = Aggregator::new(
            &config,
            order_manager.clone(),
            status_manager.clone(),
            egress_port,
            events,
        );
        aggregator.spawn_visualization_ticker(config.visualization_period);

        Arc::new(Self {
            validator: Validator::new(config.clone()),
            config,
            order_manager,
            status_manager,
            action_port,
            navigation_port,
            query_port,
            scheduler,
            aggregator,
        })
    }

    pub fn order_manager(&self) -> &Arc<OrderManager> {
        &self.order_manager
    }

    pub fn status_manager(&self) -> &Arc<StatusManager> {
        &self.status_manager
    }

    /// Validates and, if accepted, begins executing `order`. Returns
    /// any validation errors; an empty list means the order was
    /// accepted and execution has been kicked off in the background.
    pub async fn submit_order(self: &Arc<Self>, order: OrderMessage) -> Vec<ErrorRecord> {
        let (errors, valid) = self
            .validator
            .validate_order(
                &order,
                &self.order_manager,
                std::slice::from_ref(&self.action_port),
                self.query_port.as_ref(),
            )
            .await;
        let Some(valid) = valid else {
            self.aggregator.request_state_update(UpdateUrgency::high()).await;
            return errors;
        };

        self.order_manager
            .set_order_update_id(valid.order_update_id)
            .await;

        let start_after = if valid.is_append {
            let last_base = self.order_manager.last_node_sequence_id().await;
            match self.order_manager.extend_graph(valid.graph.clone()).await {
                Ok(_) => Some(last_base),
                Err(err) => {
                    warn!(%err, "graph extension rejected after validation");
                    return vec![ErrorRecord {
                        error_type: "orderError".into(),
                        error_level: ErrorLevel::Warning,
                        error_references: Default::default(),
                        error_description: err.to_string(),
                    }];
                }
            }
        } else {
            let _ = self
                .order_manager
                .replace_graph(valid.graph.clone(), &valid.order_id)
                .await;
            None
        };

        self.order_manager
            .set_order_status(OrderStatus::Active)
            .await;
        self.aggregator
            .request_state_update(UpdateUrgency::high())
            .await;

        let instance = self.clone();
        let graph = valid.graph;
        tokio::spawn(async move {
            info!("beginning order execution");
            match instance.scheduler.run_graph(&graph, start_after).await {
                Ok(()) | Err(crate::error::Vda5050Error::OrderCanceled) => {
                    instance
                        .order_manager
                        .set_order_status(OrderStatus::Idle)
                        .await;
                }
                Err(err) => {
                    warn!(%err, "order execution ended with an error");
                    instance
                        .order_manager
                        .set_order_status(OrderStatus::Failed)
                        .await;
                }
            }
            instance
                .aggregator
                .request_state_update(UpdateUrgency::high())
                .await;
        });

        Vec::new()
    }

    /// Validates and executes an `instantActions` message. Each action
    /// is accepted or rejected independently (spec.md §4.5, §7).
    pub async fn submit_instant_actions(&self, instant_actions: InstantActions) -> Vec<ErrorRecord> {
        let (errors, valid) = self
            .validator
            .validate_instant_actions(
                &instant_actions,
                &self.order_manager,
                std::slice::from_ref(&self.action_port),
            )
            .await;

        for action in valid.actions {
            let _ = self.order_manager.add_new_action(action.clone()).await;
            if let Some(control) = interpreter::classify_instant_action(&action) {
                let _ = self
                    .order_manager
                    .set_action_status(&action.action_id, crate::model::ActionStatus::Running, None)
                    .await;
                self.handle_control_instant_action(control).await;
                let _ = self
                    .order_manager
                    .set_action_status(&action.action_id, crate::model::ActionStatus::Finished, None)
                    .await;
            }
        }

        self.aggregator
            .request_state_update(UpdateUrgency::high())
            .await;
        errors
    }

    async fn handle_control_instant_action(&self, control: interpreter::ControlInstantAction) {
        use interpreter::ControlInstantAction::*;
        match control {
            CancelOrder => self.request_cancel().await,
            StartPause => self.request_pause().await,
            StopPause => self.request_resume().await,
            StateRequest => {
                self.aggregator
                    .request_state_update(UpdateUrgency::immediate())
                    .await
            }
            FactsheetRequest => {
                // Factsheet content is vehicle-specific and supplied by
                // the egress port's adapter, not assembled here.
            }
        }
    }

    /// Reports that an action the action adapter previously started has
    /// reached a terminal state, unblocking any `Hard`-ceiling group
    /// waiting on it (spec.md §3, §4.7).
    pub async fn report_action_finished(
        &self,
        action_id: &str,
        success: bool,
        description: Option<String>,
    ) {
        self.scheduler
            .on_action_finished(action_id, success, description)
            .await;
        self.aggregator
            .request_state_update(UpdateUrgency::high())
            .await;
    }

    /// Reports that a navigation step has reached `sequence_id`,
    /// unblocking a `stop_at_goal` navigation step waiting on it (spec.md
    /// §4.7).
    pub fn report_navigation_finished(&self, sequence_id: crate::model::SequenceId) {
        self.scheduler.on_navigation_finished(sequence_id);
    }

    /// Requests a pause and, once the scheduler actually quiesces on its
    /// pause latch, completes the transition to `Paused` (spec.md §4.7:
    /// `active -> pausing -> paused`).
    pub async fn request_pause(&self) {
        if !self.scheduler.query_pause_allowed().await {
            return;
        }
        self.order_manager.set_order_status(OrderStatus::Pausing).await;
        self.scheduler.request_pause();
        self.navigation_port.pause().await;

        let order_manager = self.order_manager.clone();
        let mut confirmed = self.scheduler.subscribe_paused_confirmed();
        tokio::spawn(async move {
            loop {
                if *confirmed.borrow() {
                    break;
                }
                if confirmed.changed().await.is_err() {
                    return;
                }
            }
            if order_manager.order_status().await == OrderStatus::Pausing {
                order_manager.set_order_status(OrderStatus::Paused).await;
            }
        });
    }

    /// Requests a resume and restores `Active` once the scheduler's
    /// pause latch has been released (spec.md §4.7: `paused -> resuming
    /// -> active`). Releasing the latch is synchronous from the
    /// scheduler's perspective, so `Active` can be set right away.
    pub async fn request_resume(&self) {
        if !self.scheduler.query_resume_allowed().await {
            return;
        }
        self.order_manager.set_order_status(OrderStatus::Resuming).await;
        self.scheduler.request_resume();
        self.navigation_port.resume().await;
        self.order_manager.set_order_status(OrderStatus::Active).await;
    }

    pub async fn request_cancel(&self) {
        self.order_manager.set_order_status(OrderStatus::Canceling).await;
        self.scheduler.request_cancel();
    }

    pub async fn dump_order(&self) -> OrderDump {
        self.order_manager.dump().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
