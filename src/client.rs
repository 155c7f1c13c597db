//! Client handle and builder.
//!
//! The [`ClientBuilder`] provides a fluent API for connection settings. The
//! [`Client`] is a cheap, cloneable handle onto one connection driver task:
//! every operation enqueues its request synchronously and returns a
//! [`ResponseFuture`] at once, so many requests can be in flight together.
//!
//! # Example
//!
//! ```ignore
//! use tarantool_wire::{Client, IteratorType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .host("127.0.0.1")
//!         .port(3301)
//!         .credentials("app", "secret")
//!         .build();
//!
//!     client.connect().await?;
//!     client.login().await?;
//!
//!     client.insert(512, &(1, "one")).await?;
//!     let rows: Vec<(u32, String)> = client
//!         .select(512, 0, 10, 0, IteratorType::Eq, &(1,))
//!         .decode()
//!         .await?;
//!
//!     client.destroy(false).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use rmpv::Value;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::ConnectionOptions;
use crate::connection::{Command, ConnectionState, Driver};
use crate::error::{Result, TarantoolError};
use crate::pending::ResponseFuture;
use crate::protocol::{IteratorType, Request};
use crate::transport::{Connector, TcpConnector};

/// Builder for configuring and creating a [`Client`].
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    options: ConnectionOptions,
}

impl ClientBuilder {
    /// Create a builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing options.
    pub fn from_options(options: ConnectionOptions) -> Self {
        Self { options }
    }

    /// Set the server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    /// Set the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    /// Set the credentials used by [`Client::login`].
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.options.username = Some(username.into());
        self.options.password = Some(password.into());
        self
    }

    /// Set the connect and graceful-close timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Set the reconnect flag. Stored only.
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.options.reconnect = reconnect;
        self
    }

    /// Set the largest accepted frame length.
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.options.max_frame_size = size;
        self
    }

    /// Build a client that connects over TCP.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn build(self) -> Client {
        Client::with_connector(self.options, TcpConnector)
    }

    /// Build a client that obtains its stream from `connector`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn build_with<C: Connector>(self, connector: C) -> Client {
        Client::with_connector(self.options, connector)
    }
}

/// Handle onto one connection.
///
/// Clones share the connection. When the last clone is dropped the driver
/// stops and anything still pending fails with `ConnectionClosed`.
#[derive(Clone)]
pub struct Client {
    commands: mpsc::UnboundedSender<Command>,
    options: Arc<ConnectionOptions>,
    state: watch::Receiver<ConnectionState>,
}

impl Client {
    /// Create a TCP client for `options`. Nothing is opened until
    /// [`connect`](Self::connect).
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(options: ConnectionOptions) -> Self {
        Self::with_connector(options, TcpConnector)
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client that obtains its stream from `connector`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn with_connector<C: Connector>(options: ConnectionOptions, connector: C) -> Self {
        let options = Arc::new(options);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let driver = Driver::new(connector, Arc::clone(&options), commands_rx, state_tx);
        tokio::spawn(driver.run());

        Self {
            commands: commands_tx,
            options,
            state: state_rx,
        }
    }

    /// Connection settings.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Latest published connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the connection reaches a state matching `pred`.
    pub async fn wait_for_state<F>(&self, mut pred: F) -> Result<ConnectionState>
    where
        F: FnMut(ConnectionState) -> bool,
    {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| pred(*s))
            .await
            .map_err(|_| TarantoolError::ConnectionClosed)?;
        Ok(*reached)
    }

    /// Open the transport. Resolves once the server greeting is parsed.
    pub fn connect(&self) -> ResponseFuture<()> {
        self.send(|reply| Command::Connect { reply }).map_value(to_unit)
    }

    /// Round-trip an empty request.
    pub fn ping(&self) -> ResponseFuture<Value> {
        self.request(Ok(Request::ping()))
    }

    /// Select up to `limit` tuples from `space` through `index`, skipping
    /// `offset`, matching `key` with `iterator`.
    pub fn select<K: Serialize + ?Sized>(
        &self,
        space: u32,
        index: u32,
        limit: u32,
        offset: u32,
        iterator: IteratorType,
        key: &K,
    ) -> ResponseFuture<Value> {
        self.request(Request::select(space, index, limit, offset, iterator, key))
    }

    /// Insert `tuple` into `space`.
    pub fn insert<T: Serialize + ?Sized>(&self, space: u32, tuple: &T) -> ResponseFuture<Value> {
        self.request(Request::insert(space, tuple))
    }

    /// Insert or overwrite `tuple` in `space`.
    pub fn replace<T: Serialize + ?Sized>(&self, space: u32, tuple: &T) -> ResponseFuture<Value> {
        self.request(Request::replace(space, tuple))
    }

    /// Apply update `ops` to the tuple matching `key`.
    pub fn update<K, O>(&self, space: u32, index: u32, key: &K, ops: &O) -> ResponseFuture<Value>
    where
        K: Serialize + ?Sized,
        O: Serialize + ?Sized,
    {
        self.request(Request::update(space, index, key, ops))
    }

    /// Delete the tuple matching `key`.
    pub fn delete<K: Serialize + ?Sized>(
        &self,
        space: u32,
        index: u32,
        key: &K,
    ) -> ResponseFuture<Value> {
        self.request(Request::delete(space, index, key))
    }

    /// Call a stored function.
    pub fn call<A: Serialize + ?Sized>(&self, function: &str, args: &A) -> ResponseFuture<Value> {
        self.request(Request::call(function, args))
    }

    /// Evaluate an expression on the server.
    pub fn eval<A: Serialize + ?Sized>(&self, expression: &str, args: &A) -> ResponseFuture<Value> {
        self.request(Request::eval(expression, args))
    }

    /// Authenticate with chap-sha1 using the salt from the greeting.
    pub fn auth(&self, username: &str, password: &str) -> ResponseFuture<bool> {
        let username = username.to_string();
        let password = password.to_string();
        self.send(move |reply| Command::Auth {
            username,
            password,
            reply,
        })
        .map_value(to_bool)
    }

    /// Authenticate with the configured credentials.
    pub fn login(&self) -> ResponseFuture<bool> {
        match &self.options.username {
            Some(username) => {
                let password = self.options.password.as_deref().unwrap_or_default();
                self.auth(username, password)
            }
            None => ResponseFuture::failed(
                TarantoolError::Validation("no username configured".into()),
                to_bool,
            ),
        }
    }

    /// Close the connection.
    ///
    /// Graceful (`forceful == false`) stops accepting requests and waits up to
    /// `timeout` for outstanding responses before closing; forceful fails
    /// everything at once. Either way the state ends `Disconnected`.
    pub fn destroy(&self, forceful: bool) -> ResponseFuture<()> {
        self.send(|reply| Command::Destroy { forceful, reply })
            .map_value(to_unit)
    }

    /// Hand a built request to the driver. Build errors never reach it.
    fn request(&self, request: Result<Request>) -> ResponseFuture<Value> {
        match request {
            Ok(request) => self.send(|reply| Command::Request { request, reply }),
            Err(e) => {
                tracing::debug!("Rejecting request before send: {}", e);
                ResponseFuture::failed(e, Ok)
            }
        }
    }

    fn send<F>(&self, make: F) -> ResponseFuture<Value>
    where
        F: FnOnce(oneshot::Sender<Result<Value>>) -> Command,
    {
        let (tx, rx) = oneshot::channel();
        // If the driver is gone the command (and its slot) is dropped, which
        // the future reports as ConnectionClosed.
        let _ = self.commands.send(make(tx));
        ResponseFuture::waiting(rx, Ok)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.options.address())
            .field("state", &self.state())
            .finish()
    }
}

fn to_unit(_: Value) -> Result<()> {
    Ok(())
}

fn to_bool(value: Value) -> Result<bool> {
    match value {
        Value::Boolean(ok) => Ok(ok),
        other => Err(TarantoolError::Protocol(format!(
            "unexpected auth result: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default() {
        let builder = ClientBuilder::default();
        assert_eq!(builder.options, ConnectionOptions::default());
    }

    #[test]
    fn test_builder_method_chaining() {
        let builder = Client::builder()
            .host("db")
            .port(3302)
            .credentials("app", "secret")
            .timeout(Duration::from_millis(100))
            .reconnect(false)
            .max_frame_size(4096);

        let options = &builder.options;
        assert_eq!(options.address(), "db:3302");
        assert_eq!(options.username.as_deref(), Some("app"));
        assert_eq!(options.password.as_deref(), Some("secret"));
        assert_eq!(options.timeout, Duration::from_millis(100));
        assert!(!options.reconnect);
        assert_eq!(options.max_frame_size, 4096);
    }

    #[tokio::test]
    async fn test_new_client_is_disconnected() {
        let client = Client::new(ConnectionOptions::default());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.options().port, 3301);
    }

    #[tokio::test]
    async fn test_request_before_connect_is_invalid_state() {
        let client = Client::new(ConnectionOptions::default());
        let err = client.ping().await.unwrap_err();
        assert!(matches!(
            err,
            TarantoolError::InvalidState(ConnectionState::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_validation_fails_without_driver_roundtrip() {
        let client = Client::new(ConnectionOptions::default());
        let err = client.insert(512, &42).await.unwrap_err();
        assert!(matches!(err, TarantoolError::Validation(_)));
    }

    #[tokio::test]
    async fn test_login_without_username() {
        let client = Client::new(ConnectionOptions::default());
        let err = client.login().await.unwrap_err();
        assert!(matches!(err, TarantoolError::Validation(_)));
    }

    #[tokio::test]
    async fn test_destroy_when_disconnected_is_ok() {
        let client = Client::new(ConnectionOptions::default());
        client.destroy(false).await.unwrap();
        client.destroy(true).await.unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_to_bool_rejects_non_boolean() {
        assert!(to_bool(Value::Boolean(true)).unwrap());
        assert!(to_bool(Value::Nil).is_err());
    }
}
