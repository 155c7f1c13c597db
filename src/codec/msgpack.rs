//! MsgPack codec using `rmp-serde` and `rmpv`.
//!
//! Caller arguments are serialized with `to_vec_named` so that structs land
//! on the wire as maps keyed by field name. Tuples, `Vec`s and arrays become
//! MsgPack arrays, which is what the server expects for tuples and keys.
//!
//! Replies are decoded into [`rmpv::Value`] first: the server keys its maps by
//! small integers, which serde's string-keyed maps cannot represent.

use rmpv::Value;

use crate::error::Result;

/// MessagePack codec for request arguments and response payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Decode one MsgPack value of any shape.
    ///
    /// Trailing bytes after the first value are ignored.
    pub fn decode_value(bytes: &[u8]) -> Result<Value> {
        let mut cursor = bytes;
        Ok(rmpv::decode::read_value(&mut cursor)?)
    }

    /// Convert a decoded value into a typed Rust value.
    pub fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
        Ok(rmpv::ext::from_value(value)?)
    }

    /// Check whether encoded bytes start with an array marker
    /// (fixarray, array 16 or array 32).
    #[inline]
    pub fn is_array(encoded: &[u8]) -> bool {
        matches!(encoded.first(), Some(0x90..=0x9f) | Some(0xdc) | Some(0xdd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct User {
        id: u32,
        name: String,
    }

    #[test]
    fn test_struct_encodes_as_map() {
        let user = User {
            id: 1,
            name: "x".to_string(),
        };
        let encoded = MsgPackCodec::encode(&user).unwrap();

        // 0x82 = fixmap with 2 elements
        assert_eq!(encoded[0], 0x82);
        assert!(!MsgPackCodec::is_array(&encoded));

        let decoded: User = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, user);
    }

    #[test]
    fn test_tuples_and_vecs_are_arrays() {
        assert!(MsgPackCodec::is_array(
            &MsgPackCodec::encode(&(1, "a", true)).unwrap()
        ));
        assert!(MsgPackCodec::is_array(
            &MsgPackCodec::encode(&vec![1u32; 3]).unwrap()
        ));
        assert!(MsgPackCodec::is_array(
            &MsgPackCodec::encode(&Vec::<u32>::new()).unwrap()
        ));

        // 20 elements needs array 16 (0xdc)
        let long = MsgPackCodec::encode(&vec![0u8; 20]).unwrap();
        assert_eq!(long[0], 0xdc);
        assert!(MsgPackCodec::is_array(&long));
    }

    #[test]
    fn test_scalars_are_not_arrays() {
        assert!(!MsgPackCodec::is_array(&MsgPackCodec::encode(&42).unwrap()));
        assert!(!MsgPackCodec::is_array(
            &MsgPackCodec::encode("text").unwrap()
        ));
        assert!(!MsgPackCodec::is_array(&[]));
    }

    #[test]
    fn test_decode_value_integer_keyed_map() {
        // {0x30: [1, 2]}
        let bytes = [0x81, 0x30, 0x92, 0x01, 0x02];
        let value = MsgPackCodec::decode_value(&bytes).unwrap();

        let map = value.as_map().unwrap();
        assert_eq!(map[0].0.as_u64(), Some(0x30));
        assert_eq!(map[0].1, Value::Array(vec![Value::from(1), Value::from(2)]));
    }

    #[test]
    fn test_from_value_typed() {
        let value = Value::Array(vec![Value::from(7), Value::from("seven")]);
        let typed: (u32, String) = MsgPackCodec::from_value(value).unwrap();
        assert_eq!(typed, (7, "seven".to_string()));
    }

    #[test]
    fn test_decode_error_on_truncated_data() {
        // fixarray of 3 with only one element present
        assert!(MsgPackCodec::decode_value(&[0x93, 0x01]).is_err());
    }
}
