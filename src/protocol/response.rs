//! Response decoding.
//!
//! A response payload is a header map immediately followed by a body map,
//! with no enclosing container. Prepending a 2-element fixarray marker turns
//! the payload into a single MsgPack value `[header, body]` that the generic
//! decoder can read in one pass.

use rmpv::Value;

use super::constants::keys;
use crate::codec::MsgPackCodec;
use crate::error::{Result, TarantoolError};

/// Marker for a fixarray of two elements.
const PAIR_MARKER: u8 = 0x92;

/// Decoded response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Status code, 0 on success.
    pub code: u32,
    /// Correlation id echoed from the request.
    pub sync: u32,
    /// Schema version, when the server sends one.
    pub schema_version: Option<u64>,
}

impl ResponseHeader {
    /// Check if the server reported success.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// A decoded response frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub header: ResponseHeader,
    /// Body map entries, keyed by integer key codes.
    pub body: Vec<(Value, Value)>,
}

impl Response {
    /// Decode one frame payload (length prefix already stripped).
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut wrapped = Vec::with_capacity(payload.len() + 1);
        wrapped.push(PAIR_MARKER);
        wrapped.extend_from_slice(payload);

        let mut parts = match MsgPackCodec::decode_value(&wrapped)? {
            Value::Array(parts) if parts.len() == 2 => parts,
            other => {
                return Err(TarantoolError::Protocol(format!(
                    "response is not a header/body pair: {}",
                    other
                )))
            }
        };

        let body = match parts.pop() {
            Some(Value::Map(entries)) => entries,
            Some(Value::Nil) | None => Vec::new(),
            Some(other) => {
                return Err(TarantoolError::Protocol(format!(
                    "response body is not a map: {}",
                    other
                )))
            }
        };

        let header = match parts.pop() {
            Some(Value::Map(entries)) => decode_header(&entries)?,
            _ => {
                return Err(TarantoolError::Protocol(
                    "response header is not a map".to_string(),
                ))
            }
        };

        Ok(Self { header, body })
    }

    /// Correlation id of this response.
    #[inline]
    pub fn sync(&self) -> u32 {
        self.header.sync
    }

    /// Look up a body entry by key code.
    pub fn get(&self, key: u8) -> Option<&Value> {
        lookup(&self.body, key)
    }

    /// Consume the response into its outcome: the data payload on success,
    /// a server error carrying the error payload otherwise.
    ///
    /// A success without a data entry (e.g. ping) yields `Nil`.
    pub fn into_result(self) -> Result<Value> {
        let wanted = if self.header.is_ok() {
            keys::DATA
        } else {
            keys::ERROR
        };

        let payload = self
            .body
            .into_iter()
            .find(|(k, _)| k.as_u64() == Some(wanted as u64))
            .map(|(_, v)| v)
            .unwrap_or(Value::Nil);

        if self.header.is_ok() {
            Ok(payload)
        } else {
            Err(TarantoolError::Server {
                code: self.header.code,
                payload,
            })
        }
    }
}

fn lookup(entries: &[(Value, Value)], key: u8) -> Option<&Value> {
    entries
        .iter()
        .find(|(k, _)| k.as_u64() == Some(key as u64))
        .map(|(_, v)| v)
}

fn decode_header(entries: &[(Value, Value)]) -> Result<ResponseHeader> {
    let field = |key: u8, name: &str| -> Result<u32> {
        lookup(entries, key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| TarantoolError::Protocol(format!("response header lacks {}", name)))
    };

    Ok(ResponseHeader {
        code: field(keys::CODE, "code")?,
        sync: field(keys::SYNC, "sync")?,
        schema_version: lookup(entries, keys::SCHEMA_VERSION).and_then(Value::as_u64),
    })
}
