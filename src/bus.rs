//! Parametric, typed publish/subscribe event bus (spec.md §4.1).
//!
//! One [`EventBus<E>`] instance is created per event family (action,
//! navigation, status, query, message, interpreter, order, state,
//! validation, control, factsheet). Subscriptions are scoped: a
//! [`ScopedSubscriber`] unregisters every callback it registered when
//! dropped, matching the teacher's RAII-subscriber idiom translated from
//! `eventpp::ScopedRemover` (see `generic_event_manager.h`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Result, Vda5050Error};

pub type Callback<E> = Arc<dyn Fn(Arc<E>) + Send + Sync>;

/// Dispatch mode for an [`EventBus`]: asynchronous uses a background
/// worker task draining a queue; synchronous delivers inline on the
/// caller's thread (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Asynchronous,
    Synchronous,
}

struct Subscription<E> {
    id: u64,
    callback: Callback<E>,
}

/// A typed publish/subscribe bus for one event family.
pub struct EventBus<E> {
    mode: DispatchMode,
    next_id: AtomicU64,
    subscribers: Arc<Mutex<HashMap<u64, Subscription<E>>>>,
    queue_tx: Option<mpsc::UnboundedSender<Arc<E>>>,
    stop_tx: Option<watch::Sender<bool>>,
}

impl<E: Send + Sync + 'static> EventBus<E> {
    /// Creates a bus. In asynchronous mode, spawns the background worker
    /// task immediately (one task per bus, per spec.md §5).
    pub fn new(mode: DispatchMode) -> Arc<Self> {
        let subscribers: Arc<Mutex<HashMap<u64, Subscription<E>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let (queue_tx, stop_tx) = if mode == DispatchMode::Asynchronous {
            let (tx, mut rx) = mpsc::unbounded_channel::<Arc<E>>();
            let (stop_tx, mut stop_rx) = watch::channel(false);
            let subs = subscribers.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = stop_rx.changed() => {
                            if *stop_rx.borrow() {
                                break;
                            }
                        }
                        maybe_event = rx.recv() => {
                            match maybe_event {
                                Some(event) => deliver(&subs, event).await,
                                None => break,
                            }
                        }
                        _ = tokio::time::sleep(Duration::from_millis(10)) => {}
                    }
                }
            });
            (Some(tx), Some(stop_tx))
        } else {
            (None, None)
        };

        Arc::new(Self {
            mode,
            next_id: AtomicU64::new(0),
            subscribers,
            queue_tx,
            stop_tx,
        })
    }

    /// Queues for background delivery unless synchronous dispatch is
    /// configured, in which case this delivers inline.
    pub async fn dispatch(&self, event: E) {
        let event = Arc::new(event);
        match (&self.mode, &self.queue_tx) {
            (DispatchMode::Asynchronous, Some(tx)) => {
                debug!("enqueuing event for async dispatch");
                if tx.send(event).is_err() {
                    warn!("event bus worker is gone, dropping event");
                }
            }
            _ => {
                self.synchronous_dispatch_arc(event).await;
            }
        }
    }

    /// Delivers inline unconditionally, regardless of the bus's mode.
    pub async fn synchronous_dispatch(&self, event: E) {
        self.synchronous_dispatch_arc(Arc::new(event)).await;
    }

    async fn synchronous_dispatch_arc(&self, event: Arc<E>) {
        deliver(&self.subscribers, event).await;
    }

    pub fn scoped_subscriber(self: &Arc<Self>) -> ScopedSubscriber<E> {
        ScopedSubscriber {
            bus: self.clone(),
            owned_ids: Vec::new(),
        }
    }

    pub fn shutdown(&self) {
        if let Some(tx) = &self.stop_tx {
            let _ = tx.send(true);
        }
    }
}

async fn deliver<E>(subscribers: &Arc<Mutex<HashMap<u64, Subscription<E>>>>, event: Arc<E>) {
    let callbacks: Vec<Callback<E>> = {
        let guard = subscribers.lock().await;
        guard.values().map(|s| s.callback.clone()).collect()
    };
    for cb in callbacks {
        cb(event.clone());
    }
}

/// An RAII handle that unregisters every callback it registered when
/// dropped. Dropping a handle implies dropping its subscriptions
/// (spec.md §5).
pub struct ScopedSubscriber<E: Send + Sync + 'static> {
    bus: Arc<EventBus<E>>,
    owned_ids: Vec<u64>,
}

impl<E: Send + Sync + 'static> ScopedSubscriber<E> {
    /// Registers a callback. Returns immediately; registration itself
    /// does not need to be awaited, but is async to serialize with the
    /// bus's internal lock.
    pub async fn subscribe<F>(&mut self, callback: F)
    where
        F: Fn(Arc<E>) + Send + Sync + 'static,
    {
        let id = self.bus.next_id.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.bus.subscribers.lock().await;
        guard.insert(
            id,
            Subscription {
                id,
                callback: Arc::new(callback),
            },
        );
        self.owned_ids.push(id);
    }
}

impl<E: Send + Sync + 'static> Drop for ScopedSubscriber<E> {
    fn drop(&mut self) {
        let ids = std::mem::take(&mut self.owned_ids);
        let subscribers = self.bus.subscribers.clone();
        tokio::spawn(async move {
            let mut guard = subscribers.lock().await;
            for id in ids {
                guard.remove(&id);
            }
        });
    }
}

/// A generalization of an event whose producer also waits for a result
/// (spec.md §4.1). At most one consumer can claim the result token;
/// the producer's wait is bounded.
pub struct SynchronizedEvent<T> {
    payload: T,
    result: Arc<Mutex<Option<oneshot::Sender<T::Output>>>>,
    receiver: Arc<Mutex<Option<oneshot::Receiver<T::Output>>>>,
}

/// Types that can be carried by a [`SynchronizedEvent`] must declare
/// their result type.
pub trait HasOutput {
    type Output: Send + 'static;
}

impl<T> SynchronizedEvent<T>
where
    T: HasOutput,
{
    pub fn new(payload: T) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            payload,
            result: Arc::new(Mutex::new(Some(tx))),
            receiver: Arc::new(Mutex::new(Some(rx))),
        }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Claims the single-shot result cell. Fails with
    /// `synchronized_not_acquired`-equivalent semantics if already
    /// claimed by another consumer.
    pub async fn acquire(&self) -> Result<oneshot::Sender<T::Output>> {
        let mut guard = self.result.lock().await;
        guard
            .take()
            .ok_or(Vda5050Error::SynchronizedNotAcquired)
    }

    /// The producer's bounded wait for the result.
    pub async fn wait(&self, deadline: Duration) -> Result<T::Output> {
        let mut guard = self.receiver.lock().await;
        let rx = guard.take().ok_or(Vda5050Error::SynchronizedNotAcquired)?;
        match timeout(deadline, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(Vda5050Error::SynchronizedNotAcquired),
            Err(_) => Err(Vda5050Error::TimedOut),
        }
    }
}
