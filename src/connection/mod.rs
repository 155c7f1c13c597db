//! Connection module - lifecycle state machine and its driver task.
//!
//! - [`Connection`] - transport-independent core (greeting, framing,
//!   correlation, pending registry)
//! - `driver` - the tokio task that owns a `Connection` and its socket

mod driver;
mod state;

pub(crate) use driver::{Command, Driver};
pub use state::{Connection, ConnectionState};
