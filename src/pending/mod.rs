//! Pending module - in-flight request tracking.
//!
//! Provides:
//! - [`SyncGenerator`] - per-connection correlation ids
//! - [`PendingRegistry`] - maps correlation ids to result slots
//! - [`ResponseFuture`] - the caller's side of a result slot
//!
//! # Example
//!
//! ```
//! use tarantool_wire::pending::{response_channel, PendingRegistry, SyncGenerator};
//! use tarantool_wire::protocol::RequestCode;
//!
//! let mut ids = SyncGenerator::new();
//! let mut registry = PendingRegistry::new();
//!
//! let (slot, _response) = response_channel();
//! let sync = ids.next_id();
//! registry.register(sync, RequestCode::Ping, slot).unwrap();
//!
//! assert!(registry.contains(sync));
//! ```

mod future;
mod registry;
mod sync;

pub use future::{response_channel, ResponseFuture, ResultSlot};
pub use registry::{PendingRegistry, PendingRequest};
pub use sync::{SyncGenerator, MAX_SYNC};
