//! Wire-message shapes (spec.md §6). These are the JSON payloads
//! exchanged over the message port; grounded in the field names used by
//! `vda5050-types` (the pack's dedicated VDA 5050 types crate) but kept
//! local so this crate's wire boundary doesn't depend on an external
//! crate's version cadence.

mod common;
mod connection;
mod factsheet;
mod instant_actions;
pub mod order;
mod state;
mod visualization;

pub use common::Header;
pub use connection::{Connection, ConnectionState};
pub use factsheet::Factsheet;
pub use instant_actions::InstantActions;
pub use order::{EdgeWire, NodePositionWire, NodeWire, OrderMessage};
pub use state::{BatteryState, ErrorLevel, ErrorRecord, InfoRecord, StateMessage};
pub use visualization::Visualization;
