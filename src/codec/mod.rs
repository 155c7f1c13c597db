//! Codec module - MessagePack encoding of arguments and decoding of replies.
//!
//! - [`MsgPackCodec`] - `rmp-serde` for typed caller values, `rmpv` for the
//!   dynamically shaped maps the server sends back
//!
//! # Example
//!
//! ```
//! use tarantool_wire::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&(1, "one")).unwrap();
//! assert!(MsgPackCodec::is_array(&encoded));
//!
//! let value = MsgPackCodec::decode_value(&encoded).unwrap();
//! assert_eq!(value.as_array().map(|a| a.len()), Some(2));
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
