//! Drives interpreter events to completion against the installed ports
//! (spec.md §4.7).
//!
//! The original expresses this as a tree of [`EventControlBlock`]
//! objects — chains, alternatives, latches, and bare function blocks —
//! built and torn down per order (`event_control_blocks.h`). Rust's
//! `async`/`await` already gives us sequencing (a chain is just
//! consecutive `.await`s), alternation (`tokio::select!`), and a latch
//! (awaiting a `watch` channel until a predicate holds) as language
//! features, so the scheduler below is a single async function walking
//! the interpreter's event vector rather than a block tree — the
//! idiomatic Rust shape of the same control-flow vocabulary (see
//! DESIGN.md).

mod control;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex as AsyncMutex, Notify};
use tracing::{info, warn};

use crate::error::{Result, Vda5050Error};
use crate::interpreter::{self, ActionGroup, AttachedTo, InterpreterEvent};
use crate::model::{ActionStatus, BlockingType, Graph, SequenceId};
use crate::order_manager::{OrderManager, OrderStatus};
use crate::ports::{ActionContext, ActionHandle, ActionPort, NavigationPort, QueryPort};
use crate::status_manager::StatusManager;

#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    ActionStarted(String),
    ActionFinished(String),
    ActionFailed(String, String),
    NavigationStepStarted { goal_node_id: String },
    NavigationStepFinished { sequence_id: SequenceId },
    GraphExtended { first: SequenceId, last: SequenceId },
    OrderDone,
}

/// Drives one order's graph through to completion or until canceled.
pub struct Scheduler {
    order_manager: Arc<OrderManager>,
    status_manager: Arc<StatusManager>,
    action_port: Arc<dyn ActionPort>,
    navigation_port: Arc<dyn NavigationPort>,
    query_port: Arc<dyn QueryPort>,
    events: Arc<crate::bus::EventBus<SchedulerEvent>>,
    pause_tx: watch::Sender<bool>,
    pause_rx: watch::Receiver<bool>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    nav_done_tx: watch::Sender<Option<SequenceId>>,
    nav_done_rx: watch::Receiver<Option<SequenceId>>,
    paused_confirmed_tx: watch::Sender<bool>,
    paused_confirmed_rx: watch::Receiver<bool>,
    live_handles: AsyncMutex<HashMap<String, Arc<dyn ActionHandle>>>,
    action_done: Notify,
}

impl Scheduler {
    pub fn new(
        order_manager: Arc<OrderManager>,
        status_manager: Arc<StatusManager>,
        action_port: Arc<dyn ActionPort>,
        navigation_port: Arc<dyn NavigationPort>,
        query_port: Arc<dyn QueryPort>,
        events: Arc<crate::bus::EventBus<SchedulerEvent>>,
    ) -> Self {
        let (pause_tx, pause_rx) = watch::channel(false);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (nav_done_tx, nav_done_rx) = watch::channel(None);
        let (paused_confirmed_tx, paused_confirmed_rx) = watch::channel(false);
        Self {
            order_manager,
            status_manager,
            action_port,
            navigation_port,
            query_port,
            events,
            pause_tx,
            pause_rx,
            cancel_tx,
            cancel_rx,
            nav_done_tx,
            nav_done_rx,
            paused_confirmed_tx,
            paused_confirmed_rx,
            live_handles: AsyncMutex::new(HashMap::new()),
            action_done: Notify::new(),
        }
    }

    /// Subscribes to the scheduler's pause-quiescence latch: carries
    /// `true` whenever the scheduler is actually blocked on
    /// [`Scheduler::wait_while_paused`], as opposed to merely having been
    /// asked to pause but still finishing the event in flight (spec.md
    /// §4.7: `Paused` is reported only once the order has actually
    /// stopped progressing).
    pub fn subscribe_paused_confirmed(&self) -> watch::Receiver<bool> {
        self.paused_confirmed_rx.clone()
    }

    /// Called by the navigation adapter when it reaches `sequence_id`.
    pub fn on_navigation_finished(&self, sequence_id: SequenceId) {
        let _ = self.nav_done_tx.send(Some(sequence_id));
    }

    /// Called by the action adapter once a started action finishes or
    /// fails, completing the action's state machine and, for a blocked
    /// `Hard` group, unblocking the scheduler (spec.md §4.7, §3).
    pub async fn on_action_finished(&self, action_id: &str, success: bool, description: Option<String>) {
        let status = if success {
            ActionStatus::Finished
        } else {
            ActionStatus::Failed
        };
        if let Err(err) = self
            .order_manager
            .set_action_status(action_id, status, description)
            .await
        {
            warn!(%action_id, %err, "action completion reported for an unknown or terminal action");
        }
        self.live_handles.lock().await.remove(action_id);
        self.events
            .dispatch(if success {
                SchedulerEvent::ActionFinished(action_id.to_string())
            } else {
                SchedulerEvent::ActionFailed(action_id.to_string(), "reported by adapter".into())
            })
            .await;
        self.action_done.notify_waiters();
    }

    /// Awaits `action_id` reaching a terminal state.
    ///
    /// `notified()` is created *before* the state check below so a
    /// completion reported between the check and the `select!` is not
    /// lost — `Notify`'s wakeup only reaches listeners registered at the
    /// time `notify_waiters` runs, not ones created afterward.
    async fn wait_for_action(&self, action_id: &str) -> Result<()> {
        loop {
            let notified = self.action_done.notified();
            if let Some(state) = self.order_manager.try_get_action_state(action_id).await {
                if state.is_terminal() {
                    return Ok(());
                }
            }
            if self.is_canceled() {
                return Err(Vda5050Error::OrderCanceled);
            }
            tokio::select! {
                _ = notified => {}
                _ = self.cancel_rx.clone().changed() => {}
            }
        }
    }

    pub fn request_pause(&self) {
        let _ = self.pause_tx.send(true);
    }

    pub fn request_resume(&self) {
        let _ = self.pause_tx.send(false);
    }

    pub fn request_cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Waits for an unpause or a cancel, whichever comes first — a
    /// `select!` between two [`control::await_latch`] waits, the
    /// idiomatic-Rust shape of `EventControlAlternative` racing two
    /// `EventLatch`es (see DESIGN.md).
    async fn wait_while_paused(&self) -> Result<()> {
        if !*self.pause_rx.borrow() {
            return Ok(());
        }
        let _ = self.paused_confirmed_tx.send(true);
        let result = tokio::select! {
            res = control::await_latch(self.pause_rx.clone(), |paused: &bool| !*paused) => {
                res.map(|_| ())
            }
            res = control::await_latch(self.cancel_rx.clone(), |canceled: &bool| *canceled) => {
                res?;
                Err(Vda5050Error::OrderCanceled)
            }
        };
        let _ = self.paused_confirmed_tx.send(false);
        result
    }

    fn is_canceled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    async fn wait_for_navigation(&self, sequence_id: SequenceId) -> Result<()> {
        tokio::select! {
            res = control::await_latch(
                self.nav_done_rx.clone(),
                move |v: &Option<SequenceId>| *v == Some(sequence_id),
            ) => {
                res.map(|_| ())
            }
            res = control::await_latch(self.cancel_rx.clone(), |canceled: &bool| *canceled) => {
                res?;
                Err(Vda5050Error::OrderCanceled)
            }
        }
    }

    /// Walks `graph` from `start_after` to completion, publishing
    /// [`SchedulerEvent`]s as it goes.
    pub async fn run_graph(&self, graph: &Graph, start_after: Option<SequenceId>) -> Result<()> {
        let known_ids: std::collections::HashSet<String> = self
            .order_manager
            .dump()
            .await
            .action_states
            .into_iter()
            .map(|s| s.action_id)
            .collect();
        let events = interpreter::interpret(graph, start_after, &known_ids);
        self.run_events(events).await
    }

    /// Runs the interpreted event sequence, routing every cancellation
    /// through [`Scheduler::teardown`] regardless of where it surfaces —
    /// between events or out of a blocked wait deep inside one event
    /// (spec.md §8 scenario S5: the graph must be cleared and `WAITING`
    /// actions failed even when the cancel lands mid-action or
    /// mid-navigation, not just at an event boundary).
    async fn run_events(&self, events: Vec<InterpreterEvent>) -> Result<()> {
        for event in events {
            if let Err(err) = self.run_one_event(event).await {
                return if matches!(err, Vda5050Error::OrderCanceled) {
                    self.teardown().await
                } else {
                    Err(err)
                };
            }
        }
        Ok(())
    }

    async fn run_one_event(&self, event: InterpreterEvent) -> Result<()> {
        self.wait_while_paused().await?;
        if self.is_canceled() {
            return Err(Vda5050Error::OrderCanceled);
        }

        match event {
            InterpreterEvent::NewAction(action) => {
                let _ = self.order_manager.add_new_action(action).await;
            }
            InterpreterEvent::YieldActionGroup(group)
            | InterpreterEvent::YieldInstantActionGroup(group) => {
                self.run_action_group(group).await?;
            }
            InterpreterEvent::YieldNavigationStep {
                goal,
                via_edge,
                stop_at_goal,
            } => {
                let segment_first = via_edge.as_ref().map_or(goal.sequence_id, |e| e.sequence_id);
                self.navigation_port
                    .upcoming_segment(segment_first, goal.sequence_id)
                    .await;
                self.events
                    .dispatch(SchedulerEvent::NavigationStepStarted {
                        goal_node_id: goal.node_id.clone(),
                    })
                    .await;
                self.navigation_port
                    .navigate_to_next_node(goal.clone(), via_edge)
                    .await;
                if stop_at_goal {
                    self.wait_for_navigation(goal.sequence_id).await?;
                    self.order_manager
                        .set_agv_last_node(goal.sequence_id, &goal.node_id)
                        .await?;
                    self.status_manager.reset_distance_since_last_node().await;
                    self.events
                        .dispatch(SchedulerEvent::NavigationStepFinished {
                            sequence_id: goal.sequence_id,
                        })
                        .await;
                }
            }
            InterpreterEvent::YieldGraphExtension(graph) | InterpreterEvent::YieldGraphReplacement(graph) => {
                let (first, last) = graph.bounds();
                let base_nodes: Vec<_> = graph.nodes().filter(|n| n.released).cloned().collect();
                let base_edges: Vec<_> = graph.edges().filter(|e| e.released).cloned().collect();
                if !base_nodes.is_empty() || !base_edges.is_empty() {
                    self.navigation_port.base_increased(base_nodes, base_edges).await;
                }
                let horizon_nodes: Vec<_> = graph.nodes().filter(|n| !n.released).cloned().collect();
                let horizon_edges: Vec<_> = graph.edges().filter(|e| !e.released).cloned().collect();
                self.navigation_port
                    .horizon_updated(horizon_nodes, horizon_edges)
                    .await;
                self.events
                    .dispatch(SchedulerEvent::GraphExtended { first, last })
                    .await;
            }
            InterpreterEvent::Done => {
                self.events.dispatch(SchedulerEvent::OrderDone).await;
            }
        }
        Ok(())
    }

    /// Runs one action group. `Hard`- and `Soft`-ceiling groups both
    /// block scheduler progress until every action in the group reaches
    /// a terminal state (reported back through
    /// [`Scheduler::on_action_finished`]) — `SOFT` defers the *next*
    /// step (motion) until the action finishes, it just doesn't preempt
    /// motion already under way the way `HARD` does (spec.md §4.7). Only
    /// `None`-ceiling groups are left running in `live_handles` so later
    /// groups and navigation can proceed concurrently.
    async fn run_action_group(&self, group: ActionGroup) -> Result<()> {
        let mut handles = Vec::with_capacity(group.actions.len());
        for entry in &group.actions {
            let action = &entry.action;
            let context = match group.attached_to {
                AttachedTo::Node => ActionContext::Node {
                    node_id: entry.owner_id.clone(),
                },
                AttachedTo::Edge => ActionContext::Edge {
                    edge_id: entry.owner_id.clone(),
                },
                AttachedTo::Instant => ActionContext::Instant,
            };
            if !self.action_port.matches(action) {
                self.order_manager
                    .set_action_status(
                        &action.action_id,
                        ActionStatus::Failed,
                        Some("no declaration claims this action type".into()),
                    )
                    .await?;
                continue;
            }
            let (errors, params) = self.action_port.validate(action, context).await;
            if !errors.is_empty() {
                self.order_manager
                    .set_action_status(
                        &action.action_id,
                        ActionStatus::Failed,
                        Some(errors.first().map(|e| e.error_description.clone()).unwrap_or_default()),
                    )
                    .await?;
                continue;
            }
            let handle = self
                .action_port
                .prepare(action, params.unwrap_or_default())
                .await?;
            self.order_manager
                .set_action_status(&action.action_id, ActionStatus::Initializing, None)
                .await?;
            handle.start().await?;
            self.order_manager
                .set_action_status(&action.action_id, ActionStatus::Running, None)
                .await?;
            self.events
                .dispatch(SchedulerEvent::ActionStarted(action.action_id.clone()))
                .await;
            self.live_handles
                .lock()
                .await
                .insert(action.action_id.clone(), handle.clone());
            handles.push(action.action_id.clone());
        }

        if matches!(group.blocking_ceiling, BlockingType::Hard | BlockingType::Soft) {
            for action_id in &handles {
                self.wait_for_action(action_id).await?;
            }
        }
        // None-ceiling groups are left running in `live_handles`;
        // `on_action_finished` reports their completion asynchronously
        // once the vehicle-side work finishes.
        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        info!("scheduler tearing down canceled order");
        self.navigation_port.cancel().await;
        let live_handles = self.live_handles.lock().await;
        for (action_id, handle) in live_handles.iter() {
            if let Err(err) = handle.cancel().await {
                warn!(%action_id, %err, "action cancel failed during teardown");
            }
        }
        drop(live_handles);
        self.order_manager.cancel_waiting_actions().await;
        self.order_manager
            .set_order_status(OrderStatus::Canceling)
            .await;
        self.order_manager.clear_graph().await;
        Err(Vda5050Error::OrderCanceled)
    }

    pub async fn query_pause_allowed(&self) -> bool {
        self.query_port.query_pauseable().await.1
    }

    pub async fn query_resume_allowed(&self) -> bool {
        self.query_port.query_resumable().await.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{DispatchMode, EventBus};
    use crate::model::{Action, Edge, Node};
    use crate::ports::{DefaultQueryPort, PortError};
    use async_trait::async_trait;
    use std::collections::HashMap as Map;

    struct NoopHandle;
    #[async_trait]
    impl ActionHandle for NoopHandle {
        async fn start(&self) -> Result<()> {
            Ok(())
        }
        async fn pause(&self) -> Result<()> {
            Ok(())
        }
        async fn resume(&self) -> Result<()> {
            Ok(())
        }
        async fn cancel(&self) -> Result<()> {
            Ok(())
        }
    }

    struct AcceptAllActions;
    #[async_trait]
    impl ActionPort for AcceptAllActions {
        fn matches(&self, _action: &Action) -> bool {
            true
        }
        async fn validate(
            &self,
            _action: &Action,
            _context: ActionContext,
        ) -> (Vec<PortError>, Option<Map<String, String>>) {
            (Vec::new(), Some(Map::new()))
        }
        async fn prepare(
            &self,
            _action: &Action,
            _parameters: Map<String, String>,
        ) -> Result<Arc<dyn ActionHandle>> {
            Ok(Arc::new(NoopHandle))
        }
    }

    struct InertNavigation;
    #[async_trait]
    impl NavigationPort for InertNavigation {
        async fn horizon_updated(&self, _nodes: Vec<Node>, _edges: Vec<Edge>) {}
        async fn base_increased(&self, _nodes: Vec<Node>, _edges: Vec<Edge>) {}
        async fn navigate_to_next_node(&self, _node: Node, _edge: Option<Edge>) {}
        async fn upcoming_segment(&self, _first_seq: SequenceId, _last_seq: SequenceId) {}
        async fn cancel(&self) {}
        async fn pause(&self) {}
        async fn resume(&self) {}
    }

    fn test_scheduler() -> Scheduler {
        Scheduler::new(
            Arc::new(OrderManager::new()),
            Arc::new(StatusManager::new()),
            Arc::new(AcceptAllActions),
            Arc::new(InertNavigation),
            Arc::new(DefaultQueryPort::default()),
            EventBus::new(DispatchMode::Synchronous),
        )
    }

    #[tokio::test]
    async fn hard_group_blocks_run_events_until_reported_finished() {
        let scheduler = Arc::new(test_scheduler());
        let action = Action {
            action_id: "a1".into(),
            action_type: "wait".into(),
            blocking_type: BlockingType::Hard,
            action_parameters: Default::default(),
        };
        scheduler
            .order_manager
            .add_new_action(action.clone())
            .await
            .unwrap();
        let events = vec![
            InterpreterEvent::YieldActionGroup(ActionGroup {
                actions: vec![crate::interpreter::GroupedAction {
                    owner_id: "n0".into(),
                    action,
                }],
                blocking_ceiling: BlockingType::Hard,
                attached_to: AttachedTo::Node,
            }),
            InterpreterEvent::Done,
        ];
        let sched = scheduler.clone();
        let waiter = tokio::spawn(async move { sched.run_events(events).await });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(!waiter.is_finished());
        scheduler.on_action_finished("a1", true, None).await;
        waiter.await.unwrap().unwrap();

        let state = scheduler
            .order_manager
            .get_action_state("a1")
            .await
            .unwrap();
        assert_eq!(state.status, ActionStatus::Finished);
    }

    #[tokio::test]
    async fn navigation_step_waits_for_completion_signal() {
        let scheduler = Arc::new(test_scheduler());
        let goal = Node::new("n2", 2, true);
        let sched = scheduler.clone();
        let waiter = tokio::spawn(async move {
            sched
                .run_events(vec![
                    InterpreterEvent::YieldNavigationStep {
                        goal: goal.clone(),
                        via_edge: None,
                        stop_at_goal: true,
                    },
                    InterpreterEvent::Done,
                ])
                .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        scheduler.on_navigation_finished(2);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancel_mid_wait_still_tears_down() {
        let scheduler = Arc::new(test_scheduler());
        let action = Action {
            action_id: "a1".into(),
            action_type: "wait".into(),
            blocking_type: BlockingType::Hard,
            action_parameters: Default::default(),
        };
        scheduler
            .order_manager
            .add_new_action(action.clone())
            .await
            .unwrap();
        scheduler
            .order_manager
            .add_new_action(Action {
                action_id: "pending".into(),
                action_type: "wait".into(),
                blocking_type: BlockingType::None,
                action_parameters: Default::default(),
            })
            .await
            .unwrap();

        let events = vec![
            InterpreterEvent::YieldActionGroup(ActionGroup {
                actions: vec![crate::interpreter::GroupedAction {
                    owner_id: "n0".into(),
                    action,
                }],
                blocking_ceiling: BlockingType::Hard,
                attached_to: AttachedTo::Node,
            }),
            InterpreterEvent::Done,
        ];
        let sched = scheduler.clone();
        let waiter = tokio::spawn(async move { sched.run_events(events).await });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        scheduler.request_cancel();
        let result = waiter.await.unwrap();
        assert_eq!(result, Err(Vda5050Error::OrderCanceled));

        let pending = scheduler
            .order_manager
            .get_action_state("pending")
            .await
            .unwrap();
        assert_eq!(pending.status, ActionStatus::Failed);
        assert!(!scheduler.order_manager.has_graph().await);
    }
}
