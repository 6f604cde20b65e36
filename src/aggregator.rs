//! Assembles `OrderManager`/`StatusManager` snapshots into outbound
//! wire messages and drives their publication cadence (spec.md §4.8).
//!
//! Grounded in `doStateUpdate()` (`state_update_timer.cpp`): "dump the
//! order manager, dump the status manager, send". The visualization
//! side runs its own, simpler periodic tick — VDA 5050 gives it no
//! urgency levels, just a fixed period (spec.md §4.10).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::bus::{EventBus, ScopedSubscriber};
use crate::config::Config;
use crate::order_manager::OrderManager;
use crate::ports::MessageEgressPort;
use crate::scheduler::SchedulerEvent;
use crate::status_manager::StatusManager;
use crate::throttle::{Throttle, UpdateUrgency};
use crate::wire::order::{EdgeWire, NodeWire};
use crate::wire::{BatteryState, Header, InfoRecord, StateMessage, Visualization};

fn build_state_message(
    order: &crate::order_manager::OrderDump,
    status: &crate::status_manager::StatusDump,
    header: Header,
) -> StateMessage {
    StateMessage {
        header,
        order_id: order.order_id.clone(),
        order_update_id: order.order_update_id,
        last_node_id: order.last_node_id.clone(),
        last_node_sequence_id: order.last_node_sequence_id,
        node_states: order.nodes.iter().map(NodeWire::from).collect(),
        edge_states: order.edges.iter().map(EdgeWire::from).collect(),
        action_states: order.action_states.clone(),
        driving: status.driving,
        distance_since_last_node: status.distance_since_last_node,
        operating_mode: status.operating_mode.clone(),
        battery_state: BatteryState {
            battery_charge: status.battery.charge,
            battery_voltage: None,
            battery_health: None,
            charging: status.battery.charging,
            reach: status.battery.reach,
        },
        errors: status.errors.clone(),
        information: status
            .infos
            .iter()
            .map(|i| InfoRecord {
                info_type: i.info_type.clone(),
                info_description: i.info_description.clone(),
            })
            .collect(),
        new_base_requested: status.new_base_requested,
        order_status: format!("{:?}", order.order_status).to_uppercase(),
    }
}

/// Owns the state/visualization publication cadence for one AGV
/// instance, reacting to scheduler events the way `state_update_timer`
/// reacts to the original's event bus (spec.md §4.8: the aggregator is
/// a subscriber, not just a throttle wrapper).
pub struct Aggregator {
    status_manager: Arc<StatusManager>,
    egress: Arc<dyn MessageEgressPort>,
    state_throttle: Arc<Throttle>,
    manufacturer: String,
    serial_number: String,
    version: String,
    scheduler_events: AsyncMutex<Option<ScopedSubscriber<SchedulerEvent>>>,
}

impl Aggregator {
    pub fn new(
        config: &Config,
        order_manager: Arc<OrderManager>,
        status_manager: Arc<StatusManager>,
        egress: Arc<dyn MessageEgressPort>,
        events: Arc<EventBus<SchedulerEvent>>,
    ) -> Arc<Self> {
        let om = order_manager.clone();
        let sm = status_manager.clone();
        let eg = egress.clone();
        let manufacturer = config.manufacturer.clone();
        let serial_number = config.serial_number.clone();
        let version = config
            .compatible_versions
            .first()
            .cloned()
            .unwrap_or_else(|| "2.0.0".to_string());
        let header_manufacturer = manufacturer.clone();
        let header_serial_number = serial_number.clone();
        let header_version = version.clone();
        let state_throttle = Throttle::spawn(
            config.state_update_max_period,
            Arc::new(move || {
                let om = om.clone();
                let sm = sm.clone();
                let eg = eg.clone();
                let manufacturer = header_manufacturer.clone();
                let serial_number = header_serial_number.clone();
                let version = header_version.clone();
                Box::pin(async move {
                    let order = om.dump().await;
                    let status = sm.dump().await;
                    let header = Header {
                        header_id: eg.next_header_id("state"),
                        timestamp: chrono::Utc::now(),
                        version,
                        manufacturer,
                        serial_number,
                    };
                    debug!(order_id = %order.order_id, "publishing state");
                    eg.send_state(build_state_message(&order, &status, header))
                        .await;
                })
            }),
        );

        let aggregator = Arc::new(Self {
            status_manager,
            egress,
            state_throttle,
            manufacturer,
            serial_number,
            version,
            scheduler_events: AsyncMutex::new(None),
        });
        aggregator.clone().subscribe_to_scheduler_events(events);
        aggregator
    }

    /// Registers this aggregator as a [`SchedulerEvent`] subscriber so a
    /// `dispatch` from the scheduler actually reaches a published state,
    /// instead of only the direct `request_state_update` calls around
    /// order submission and control instant actions.
    fn subscribe_to_scheduler_events(self: Arc<Self>, events: Arc<EventBus<SchedulerEvent>>) {
        tokio::spawn(async move {
            let mut subscriber = events.scoped_subscriber();
            let handler = self.clone();
            subscriber
                .subscribe(move |event: Arc<SchedulerEvent>| {
                    if let Some(urgency) = Aggregator::urgency_for(&event) {
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            handler.request_state_update(urgency).await;
                        });
                    }
                })
                .await;
            *self.scheduler_events.lock().await = Some(subscriber);
        });
    }

    /// Maps a scheduler event to the urgency its resulting state update
    /// should carry (spec.md §4.8, §4.9).
    fn urgency_for(event: &SchedulerEvent) -> Option<UpdateUrgency> {
        match event {
            SchedulerEvent::ActionStarted(_)
            | SchedulerEvent::ActionFinished(_)
            | SchedulerEvent::ActionFailed(_, _)
            | SchedulerEvent::NavigationStepStarted { .. }
            | SchedulerEvent::NavigationStepFinished { .. }
            | SchedulerEvent::GraphExtended { .. }
            | SchedulerEvent::OrderDone => Some(UpdateUrgency::high()),
        }
    }

    pub async fn request_state_update(&self, urgency: UpdateUrgency) {
        self.state_throttle.request_update(urgency).await;
    }

    /// Spawns the fixed-period visualization ticker (spec.md §4.10: no
    /// urgency levels, just `visualization_period`).
    pub fn spawn_visualization_ticker(self: &Arc<Self>, period: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                this.publish_visualization_once().await;
            }
        });
    }

    async fn publish_visualization_once(&self) {
        let status = self.status_manager.dump().await;
        let (position_x, position_y) = status
            .position
            .as_ref()
            .map(|p| (Some(p.x), Some(p.y)))
            .unwrap_or((None, None));
        let theta = status.position.as_ref().map(|p| p.theta);
        let visualization = Visualization {
            header: Header {
                header_id: self.egress.next_header_id("visualization"),
                timestamp: chrono::Utc::now(),
                version: self.version.clone(),
                manufacturer: self.manufacturer.clone(),
                serial_number: self.serial_number.clone(),
            },
            position_x,
            position_y,
            theta,
            velocity_vx: status.velocity.vx,
            velocity_vy: status.velocity.vy,
            velocity_omega: status.velocity.omega,
        };
        self.egress.send_visualization(visualization).await;
    }

    pub fn shutdown(&self) {
        self.state_throttle.shutdown();
    }
}
