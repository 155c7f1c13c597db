//! TCP transport.

use tokio::net::TcpStream;

use super::{BoxFuture, Connector};
use crate::config::ConnectionOptions;

/// Connects over TCP to `host:port` with Nagle disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(
        &self,
        options: &ConnectionOptions,
    ) -> BoxFuture<'static, std::io::Result<TcpStream>> {
        let address = options.address();
        Box::pin(async move {
            tracing::debug!("Connecting to {}", address);
            let stream = TcpStream::connect(&address).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connects_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let options = ConnectionOptions {
            host: "127.0.0.1".to_string(),
            port,
            ..ConnectionOptions::default()
        };

        let (stream, accepted) = tokio::join!(TcpConnector.connect(&options), listener.accept());
        let stream = stream.unwrap();
        accepted.unwrap();
        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let options = ConnectionOptions {
            host: "127.0.0.1".to_string(),
            port,
            ..ConnectionOptions::default()
        };

        assert!(TcpConnector.connect(&options).await.is_err());
    }
}
