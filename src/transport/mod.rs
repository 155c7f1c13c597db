//! Transport module - how a connection obtains its byte stream.
//!
//! The connection core treats the transport as an opaque duplex byte
//! channel. [`TcpConnector`] is the default; tests plug in in-memory
//! streams through the same [`Connector`] trait.

mod tcp;

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::ConnectionOptions;

pub use tcp::TcpConnector;

/// Boxed future returned by connectors.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opens the byte stream for a connection.
pub trait Connector: Send + Sync + 'static {
    /// Stream type produced on success.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open a stream to the server described by `options`.
    fn connect(
        &self,
        options: &ConnectionOptions,
    ) -> BoxFuture<'static, std::io::Result<Self::Stream>>;
}
