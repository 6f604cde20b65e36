//! Throttles how often `State`/`Visualization` messages go out
//! (spec.md §4.9-4.10), translated from `state_update_timer.h` /
//! `state_update_urgency.h`.
//!
//! A background task sleeps until either `max_period` has elapsed since
//! the last publish, or an earlier `request_update` deadline arrives,
//! whichever is sooner. An immediate request bypasses the sleep and
//! publishes synchronously — the caller observes the publish happen
//! before `request_update` returns, matching the original's "immediate
//! requires blocking until the state is actually sent" comment.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateUrgency {
    max_delay: Duration,
}

impl UpdateUrgency {
    pub fn immediate() -> Self {
        Self {
            max_delay: Duration::ZERO,
        }
    }

    pub fn high() -> Self {
        Self {
            max_delay: Duration::from_millis(100),
        }
    }

    pub fn medium() -> Self {
        Self {
            max_delay: Duration::from_secs(1),
        }
    }

    pub fn low() -> Self {
        Self {
            max_delay: Duration::from_secs(5),
        }
    }

    pub fn custom(max_delay: Duration) -> Self {
        Self { max_delay }
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn is_immediate(&self) -> bool {
        self.max_delay.is_zero()
    }
}

pub type PublishFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Owns the background timer task. Dropping every clone of the
/// returned `Arc<Throttle>` does not stop the task; call [`Throttle::shutdown`]
/// explicitly, the way the original's `deinitialize` joins its thread.
pub struct Throttle {
    publish: PublishFn,
    last_sent: Arc<Mutex<Instant>>,
    next_tx: watch::Sender<Option<Instant>>,
    stop_tx: watch::Sender<bool>,
}

impl Throttle {
    /// Spawns the timer loop. `max_period` is the unconditional upper
    /// bound between publishes even with no requests at all.
    pub fn spawn(max_period: Duration, publish: PublishFn) -> Arc<Self> {
        let (next_tx, mut next_rx) = watch::channel(None);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let last_sent = Arc::new(Mutex::new(Instant::now()));

        let loop_publish = publish.clone();
        let loop_last_sent = last_sent.clone();
        tokio::spawn(async move {
            loop {
                let last = *loop_last_sent.lock().expect("not poisoned");
                let deadline = match *next_rx.borrow() {
                    Some(requested) => requested.min(last + max_period),
                    None => last + max_period,
                };

                tokio::select! {
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = next_rx.changed() => {
                        // a sooner deadline may have arrived; loop re-evaluates it
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        debug!("state update timer firing");
                        (loop_publish)().await;
                        *loop_last_sent.lock().expect("not poisoned") = Instant::now();
                        next_rx.borrow_and_update();
                    }
                }
            }
        });

        Arc::new(Self {
            publish,
            last_sent,
            next_tx,
            stop_tx,
        })
    }

    /// Requests a publish within `urgency.max_delay()`. An immediate
    /// urgency publishes inline before returning.
    pub async fn request_update(&self, urgency: UpdateUrgency) {
        if urgency.is_immediate() {
            (self.publish)().await;
            *self.last_sent.lock().expect("not poisoned") = Instant::now();
            let _ = self.next_tx.send(None);
            return;
        }
        let when = Instant::now() + urgency.max_delay();
        let current = *self.next_tx.borrow();
        let new_deadline = match current {
            Some(existing) => existing.min(when),
            None => when,
        };
        let _ = self.next_tx.send(Some(new_deadline));
    }

    pub fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn immediate_publishes_before_returning() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let throttle = Throttle::spawn(
            Duration::from_secs(30),
            Arc::new(move || {
                let c = c.clone();
                Box::pin(async move {
                    c.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );
        throttle.request_update(UpdateUrgency::immediate()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        throttle.shutdown();
    }

    #[tokio::test]
    async fn high_urgency_fires_within_its_deadline() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let throttle = Throttle::spawn(
            Duration::from_secs(30),
            Arc::new(move || {
                let c = c.clone();
                Box::pin(async move {
                    c.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );
        throttle.request_update(UpdateUrgency::high()).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        throttle.shutdown();
    }
}
