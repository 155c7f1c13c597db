//! Error types for tarantool-wire.

use std::sync::Arc;
use std::time::Duration;

use rmpv::Value;
use thiserror::Error;

use crate::connection::ConnectionState;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum TarantoolError {
    /// I/O error outside the established connection (e.g. reading config).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Socket-level failure. Shared because one failure fails every
    /// outstanding request.
    #[error("Transport error: {0}")]
    Transport(Arc<std::io::Error>),

    /// MsgPack serialization error for a caller argument.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Response bytes are not a valid MsgPack value.
    #[error("MsgPack value error: {0}")]
    ValueDecode(#[from] rmpv::decode::Error),

    /// Decoded value does not fit the requested Rust type.
    #[error("MsgPack conversion error: {0}")]
    ValueConvert(#[from] rmpv::ext::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed caller argument, rejected before anything is written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The server answered with a nonzero status code.
    #[error("Server error (code {code:#x}): {payload}")]
    Server {
        /// Raw status code from the response header.
        code: u32,
        /// Decoded error payload from the response body.
        payload: Value,
    },

    /// Corrupt or implausible length prefix.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Malformed greeting or response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation is not allowed in the current connection state.
    #[error("Operation not allowed while {0:?}")]
    InvalidState(ConnectionState),

    /// Authentication attempted before the greeting supplied a salt.
    #[error("No salt received from server greeting")]
    MissingSalt,

    /// Connection closed before a response arrived.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Bounded wait expired.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl TarantoolError {
    /// Wrap a socket failure so it can be handed to every pending request.
    pub fn transport(err: std::io::Error) -> Self {
        TarantoolError::Transport(Arc::new(err))
    }

    /// Check if this error came from the server rather than the client.
    pub fn is_server_error(&self) -> bool {
        matches!(self, TarantoolError::Server { .. })
    }

    /// Convert into a form that [`replicate`](Self::replicate) copies faithfully.
    pub(crate) fn into_shared(self) -> Self {
        match self {
            TarantoolError::Io(e) => TarantoolError::Transport(Arc::new(e)),
            other => other,
        }
    }

    /// Copy a connection-level error for each request it fails.
    ///
    /// Variants that carry non-cloneable sources degrade to `Protocol` with
    /// the same message.
    pub(crate) fn replicate(&self) -> Self {
        match self {
            TarantoolError::Transport(e) => TarantoolError::Transport(Arc::clone(e)),
            TarantoolError::Framing(m) => TarantoolError::Framing(m.clone()),
            TarantoolError::Protocol(m) => TarantoolError::Protocol(m.clone()),
            TarantoolError::Timeout(d) => TarantoolError::Timeout(*d),
            TarantoolError::ConnectionClosed => TarantoolError::ConnectionClosed,
            TarantoolError::MissingSalt => TarantoolError::MissingSalt,
            TarantoolError::InvalidState(s) => TarantoolError::InvalidState(*s),
            other => TarantoolError::Protocol(other.to_string()),
        }
    }
}

/// Result type alias using TarantoolError.
pub type Result<T> = std::result::Result<T, TarantoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replicate_shares_transport_error() {
        let err = TarantoolError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ))
        .into_shared();

        let (a, b) = (err.replicate(), err.replicate());
        match (a, b) {
            (TarantoolError::Transport(a), TarantoolError::Transport(b)) => {
                assert!(Arc::ptr_eq(&a, &b));
                assert_eq!(a.kind(), std::io::ErrorKind::ConnectionReset);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_replicate_keeps_framing_message() {
        let err = TarantoolError::Framing("bad marker".into());
        assert!(matches!(err.replicate(), TarantoolError::Framing(m) if m == "bad marker"));
    }

    #[test]
    fn test_replicate_degrades_uncloneable() {
        let err = TarantoolError::Validation("nope".into());
        match err.replicate() {
            TarantoolError::Protocol(m) => assert!(m.contains("nope")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_server_error_display() {
        let err = TarantoolError::Server {
            code: 0x8012,
            payload: Value::from("Space '999' does not exist"),
        };
        assert!(err.is_server_error());
        assert!(err.to_string().contains("0x8012"));
        assert!(err.to_string().contains("does not exist"));
    }
}
