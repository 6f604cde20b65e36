//! Crate-wide error type.
//!
//! Every fallible API in this crate returns [`Result<T>`]. Protocol-level
//! rejections (a bad order, an unknown action type) are *not* represented
//! here: those become `Error` records on the next `State` publication
//! (see [`crate::validator`]). This enum is for contract violations and
//! infrastructure faults — the things spec.md §7 calls out as
//! "programmer contract violations" and "transport-layer faults".

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Vda5050Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Vda5050Error {
    /// An API contract was broken by the caller, e.g. extending a graph
    /// at the wrong seam, or setting the AGV position to a horizon node.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An event payload failed a structural precondition.
    #[error("invalid event data: {0}")]
    InvalidEventData(String),

    /// An operation was attempted in a state that makes it impossible,
    /// e.g. enabling an empty `EventControlChain`.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A [`crate::bus::SynchronizedEvent`]'s result cell was never
    /// claimed by a consumer before the producer read it.
    #[error("synchronized event result was never acquired")]
    SynchronizedNotAcquired,

    /// A synchronized event or bounded wait exceeded its deadline.
    #[error("operation timed out")]
    TimedOut,

    /// A global accessor was used before the runtime was initialized.
    #[error("not initialized")]
    NotInitialized,

    /// Configuration mismatch, missing required key, or validator
    /// rejection on load.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A subconfig or payload downcast mismatched the expected type.
    #[error("bad cast: {0}")]
    BadCast(String),

    /// Transport-layer fault, reported by the adapter at the message
    /// port boundary.
    #[error("mqtt error: {0}")]
    Mqtt(String),

    /// The scheduler unwound an in-progress order because of a
    /// `cancelOrder` instant action. Not a failure: the order ends
    /// `IDLE`, not `FAILED` (spec.md §8 scenario S5).
    #[error("order canceled")]
    OrderCanceled,
}
