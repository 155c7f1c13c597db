//! Protocol module - wire format, framing, request and response codecs.
//!
//! This module implements the binary protocol:
//! - 5-byte length prefix and fixed request header
//! - Frame buffer for reassembling partial reads
//! - Request encoding and response decoding
//! - Greeting parsing and chap-sha1 scramble

mod auth;
mod constants;
mod frame_buffer;
mod request;
mod response;
mod wire_format;

pub use auth::{scramble, Greeting};
pub use constants::{keys, IteratorType, RequestCode, AUTH_MECHANISM};
pub use frame_buffer::FrameBuffer;
pub use request::{build_frame, Request, SCRAMBLE_SIZE};
pub use response::{Response, ResponseHeader};
pub use wire_format::{
    decode_length_prefix, encode_length_prefix, encode_request_header, DEFAULT_MAX_FRAME_SIZE,
    GREETING_SIZE, LENGTH_MARKER, LENGTH_PREFIX_SIZE, REQUEST_HEADER_SIZE, SALT_LENGTH,
    SALT_OFFSET,
};
