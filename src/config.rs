//! Connection configuration.
//!
//! Options can be built in code (usually through
//! [`ClientBuilder`](crate::ClientBuilder)) or loaded from JSON:
//!
//! ```
//! use tarantool_wire::ConnectionOptions;
//!
//! let options = ConnectionOptions::from_json(
//!     r#"{ "host": "db.internal", "port": 3302, "timeout_ms": 1500 }"#,
//! ).unwrap();
//!
//! assert_eq!(options.address(), "db.internal:3302");
//! assert_eq!(options.timeout.as_millis(), 1500);
//! assert!(options.reconnect);
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3301;

/// Default timeout for connect and graceful close.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for one connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// User for [`Client::login`](crate::Client::login).
    pub username: Option<String>,
    /// Password for [`Client::login`](crate::Client::login).
    pub password: Option<String>,
    /// Bounds the transport connect and the drain of a graceful destroy.
    /// Individual requests are never timed out.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Accepted for compatibility; the client never reconnects on its own.
    pub reconnect: bool,
    /// Largest frame length accepted from the server.
    pub max_frame_size: u32,
}

impl ConnectionOptions {
    /// Options for `host:port`, everything else default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Parse options from a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON options file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// `host:port` string for the transport.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            timeout: DEFAULT_TIMEOUT,
            reconnect: true,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("reconnect", &self.reconnect)
            .field("max_frame_size", &self.max_frame_size)
            .finish()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
