//! # tarantool-wire
//!
//! Async client for the Tarantool binary protocol.
//!
//! One [`Client`] drives one TCP connection. Requests are multiplexed over
//! it and matched to responses by sync id, so any number can be in flight
//! and the server may answer them in any order.
//!
//! ## Architecture
//!
//! - **Protocol**: length-prefixed MsgPack frames, request encoding,
//!   response decoding, greeting and chap-sha1 scramble
//! - **Connection**: a sans-IO state machine plus the tokio task that owns
//!   the socket
//! - **Client**: a cloneable handle that turns calls into commands for the
//!   driver and hands back a [`ResponseFuture`]
//!
//! ## Example
//!
//! ```ignore
//! use tarantool_wire::Client;
//!
//! #[tokio::main]
//! async fn main() -> tarantool_wire::Result<()> {
//!     let client = Client::builder().host("127.0.0.1").port(3301).build();
//!     client.connect().await?;
//!
//!     let result = client.call("box.info", &()).await?;
//!     println!("{}", result);
//!
//!     client.destroy(false).await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod pending;
pub mod protocol;
pub mod transport;

mod client;
mod writer;

pub use client::{Client, ClientBuilder};
pub use config::ConnectionOptions;
pub use connection::ConnectionState;
pub use error::{Result, TarantoolError};
pub use pending::ResponseFuture;
pub use protocol::IteratorType;
pub use rmpv::Value;
