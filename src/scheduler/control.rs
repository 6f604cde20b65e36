//! A small generic translation of `EventLatch` (`event_control_blocks.h`):
//! wait for a `watch` channel to carry a value matching a predicate.
//! Chains and alternatives don't need a helper of their own — they're
//! just `.await` in sequence, or `tokio::select!`, respectively.

use tokio::sync::watch;

use crate::error::{Result, Vda5050Error};

/// Waits until `rx`'s value satisfies `predicate`.
pub async fn await_latch<T, F>(mut rx: watch::Receiver<T>, predicate: F) -> Result<T>
where
    T: Clone + Send + Sync,
    F: Fn(&T) -> bool,
{
    loop {
        if predicate(&rx.borrow()) {
            return Ok(rx.borrow().clone());
        }
        rx.changed()
            .await
            .map_err(|_| Vda5050Error::InvalidState("latch channel closed".into()))?;
    }
}
