//! Wire format encoding and decoding.
//!
//! Every frame starts with a 5-byte length prefix, a MsgPack uint32:
//! ```text
//! ┌────────┬─────────────────┬──────────────┬────────────┐
//! │ 0xCE   │ Length          │ Header map   │ Body map   │
//! │ 1 byte │ 4 bytes, u32 BE │ Length bytes in total     │
//! └────────┴─────────────────┴──────────────┴────────────┘
//! ```
//!
//! The request header is always the same 9-byte map
//! `{code: <opcode>, sync: <u32 BE>}`.

use super::constants::{keys, RequestCode};
use crate::error::{Result, TarantoolError};

/// Length prefix size in bytes (marker + u32).
pub const LENGTH_PREFIX_SIZE: usize = 5;

/// MsgPack uint32 marker that opens every length prefix.
pub const LENGTH_MARKER: u8 = 0xce;

/// Encoded request header size in bytes.
pub const REQUEST_HEADER_SIZE: usize = 9;

/// Default maximum accepted frame length (64 MB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Size of the greeting banner sent by the server on connect.
pub const GREETING_SIZE: usize = 128;

/// Offset of the base64 salt inside the greeting.
pub const SALT_OFFSET: usize = 64;

/// Length of the base64 salt string.
pub const SALT_LENGTH: usize = 44;

/// Encode the length prefix for a payload of `length` bytes.
#[inline]
pub fn encode_length_prefix(length: u32) -> [u8; LENGTH_PREFIX_SIZE] {
    let mut buf = [LENGTH_MARKER, 0, 0, 0, 0];
    buf[1..5].copy_from_slice(&length.to_be_bytes());
    buf
}

/// Decode a length prefix.
///
/// Returns `Ok(None)` if fewer than 5 bytes are available.
///
/// # Errors
///
/// Returns a framing error if the marker byte is not a uint32 marker or the
/// declared length exceeds `max_frame_size`.
pub fn decode_length_prefix(buf: &[u8], max_frame_size: u32) -> Result<Option<u32>> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    if buf[0] != LENGTH_MARKER {
        return Err(TarantoolError::Framing(format!(
            "Unexpected length marker {:#04x}",
            buf[0]
        )));
    }

    let length = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
    if length > max_frame_size {
        return Err(TarantoolError::Framing(format!(
            "Frame size {} exceeds maximum {}",
            length, max_frame_size
        )));
    }

    Ok(Some(length))
}

/// Encode the request header map for `code` with correlation id `sync`.
pub fn encode_request_header(code: RequestCode, sync: u32) -> [u8; REQUEST_HEADER_SIZE] {
    let mut buf = [
        0x82,
        keys::CODE,
        code.code(),
        keys::SYNC,
        LENGTH_MARKER,
        0,
        0,
        0,
        0,
    ];
    buf[5..9].copy_from_slice(&sync.to_be_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_prefix_big_endian() {
        let prefix = encode_length_prefix(0x01020304);
        assert_eq!(prefix, [0xce, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(
            decode_length_prefix(&prefix, u32::MAX).unwrap(),
            Some(0x01020304)
        );
    }

    #[test]
    fn test_length_prefix_needs_five_bytes() {
        assert_eq!(
            decode_length_prefix(&[0xce, 0, 0, 0], DEFAULT_MAX_FRAME_SIZE).unwrap(),
            None
        );
    }

    #[test]
    fn test_length_prefix_rejects_oversized() {
        let prefix = encode_length_prefix(1000);
        let err = decode_length_prefix(&prefix, 100).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_length_prefix_rejects_wrong_marker() {
        let err = decode_length_prefix(&[0xcd, 0, 0, 0, 1], DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert!(err.to_string().contains("length marker"));
    }

    #[test]
    fn test_request_header_layout() {
        let header = encode_request_header(RequestCode::Ping, 0xDEADBEEF);
        assert_eq!(
            header,
            [0x82, 0x00, 0x40, 0x01, 0xce, 0xde, 0xad, 0xbe, 0xef]
        );
    }

    #[test]
    fn test_salt_fits_inside_greeting() {
        assert_eq!(SALT_OFFSET + SALT_LENGTH, 108);
        assert!(SALT_OFFSET + SALT_LENGTH <= GREETING_SIZE);
    }
}
