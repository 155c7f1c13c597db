//! Request encoding.
//!
//! A request is an opcode plus a pre-encoded body map. The body is assembled
//! by hand from key constants and individually serialized argument values,
//! so argument validation happens once, when the [`Request`] is built, and
//! encoding a frame for a given sync id cannot fail.
//!
//! # Example
//!
//! ```
//! use tarantool_wire::protocol::{Request, RequestCode};
//!
//! let request = Request::insert(512, &(1, "one")).unwrap();
//! assert_eq!(request.code(), RequestCode::Insert);
//!
//! let frame = request.encode(7);
//! // prefix (5) + header (9) + body
//! assert_eq!(frame.len(), 5 + 9 + request.body().len());
//!
//! // Non-array tuples never become requests
//! assert!(Request::insert(512, &"scalar").is_err());
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::constants::{keys, IteratorType, RequestCode, AUTH_MECHANISM};
use super::wire_format::{
    encode_length_prefix, encode_request_header, LENGTH_PREFIX_SIZE, REQUEST_HEADER_SIZE,
};
use crate::codec::MsgPackCodec;
use crate::error::{Result, TarantoolError};

/// Scramble length for chap-sha1 (one SHA-1 digest).
pub const SCRAMBLE_SIZE: usize = 20;

const NIL_MARKER: u8 = 0xc0;
const EMPTY_ARRAY_MARKER: u8 = 0x90;

/// An encoded request body waiting for a sync id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    code: RequestCode,
    body: Bytes,
}

/// Incremental writer for a fixmap body.
struct BodyBuilder {
    buf: Vec<u8>,
}

impl BodyBuilder {
    fn new(entries: u8) -> Self {
        debug_assert!(entries < 16);
        let mut buf = Vec::with_capacity(64);
        buf.push(0x80 | entries);
        Self { buf }
    }

    fn raw(mut self, key: u8, encoded: &[u8]) -> Self {
        self.buf.push(key);
        self.buf.extend_from_slice(encoded);
        self
    }

    fn value<T: Serialize + ?Sized>(self, key: u8, value: &T) -> Result<Self> {
        let encoded = MsgPackCodec::encode(value)?;
        Ok(self.raw(key, &encoded))
    }

    fn finish(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

/// Serialize `value` and require it to be a MsgPack array.
fn encode_array<T: Serialize + ?Sized>(value: &T, what: &str) -> Result<Vec<u8>> {
    let encoded = MsgPackCodec::encode(value)?;
    if !MsgPackCodec::is_array(&encoded) {
        return Err(TarantoolError::Validation(format!("{} must be an array", what)));
    }
    Ok(encoded)
}

/// Serialize a call/eval argument list. `()` becomes an empty array.
fn encode_args<A: Serialize + ?Sized>(args: &A) -> Result<Vec<u8>> {
    let encoded = MsgPackCodec::encode(args)?;
    if encoded == [NIL_MARKER] {
        return Ok(vec![EMPTY_ARRAY_MARKER]);
    }
    if !MsgPackCodec::is_array(&encoded) {
        return Err(TarantoolError::Validation(
            "arguments must be an array".to_string(),
        ));
    }
    Ok(encoded)
}

impl Request {
    /// Keep-alive request with an empty body.
    pub fn ping() -> Self {
        Self {
            code: RequestCode::Ping,
            body: BodyBuilder::new(0).finish(),
        }
    }

    /// Select tuples from `space` through `index`.
    pub fn select<K: Serialize + ?Sized>(
        space: u32,
        index: u32,
        limit: u32,
        offset: u32,
        iterator: IteratorType,
        key: &K,
    ) -> Result<Self> {
        let body = BodyBuilder::new(6)
            .value(keys::SPACE_ID, &space)?
            .value(keys::INDEX_ID, &index)?
            .value(keys::LIMIT, &limit)?
            .value(keys::OFFSET, &offset)?
            .raw(keys::ITERATOR, &[iterator.code()])
            .value(keys::KEY, key)?
            .finish();

        Ok(Self {
            code: RequestCode::Select,
            body,
        })
    }

    /// Insert a tuple. Fails if `tuple` does not serialize to an array.
    pub fn insert<T: Serialize + ?Sized>(space: u32, tuple: &T) -> Result<Self> {
        Self::store(RequestCode::Insert, space, tuple)
    }

    /// Insert or overwrite a tuple. Fails if `tuple` does not serialize to an array.
    pub fn replace<T: Serialize + ?Sized>(space: u32, tuple: &T) -> Result<Self> {
        Self::store(RequestCode::Replace, space, tuple)
    }

    fn store<T: Serialize + ?Sized>(code: RequestCode, space: u32, tuple: &T) -> Result<Self> {
        let tuple = encode_array(tuple, "tuple")?;
        let body = BodyBuilder::new(2)
            .value(keys::SPACE_ID, &space)?
            .raw(keys::TUPLE, &tuple)
            .finish();

        Ok(Self { code, body })
    }

    /// Update the tuple matching `key`. Fails if `ops` does not serialize
    /// to an array.
    pub fn update<K, O>(space: u32, index: u32, key: &K, ops: &O) -> Result<Self>
    where
        K: Serialize + ?Sized,
        O: Serialize + ?Sized,
    {
        let ops = encode_array(ops, "update operations")?;
        let body = BodyBuilder::new(4)
            .value(keys::SPACE_ID, &space)?
            .value(keys::INDEX_ID, &index)?
            .value(keys::KEY, key)?
            .raw(keys::TUPLE, &ops)
            .finish();

        Ok(Self {
            code: RequestCode::Update,
            body,
        })
    }

    /// Delete the tuple matching `key`.
    pub fn delete<K: Serialize + ?Sized>(space: u32, index: u32, key: &K) -> Result<Self> {
        let body = BodyBuilder::new(3)
            .value(keys::SPACE_ID, &space)?
            .value(keys::INDEX_ID, &index)?
            .value(keys::KEY, key)?
            .finish();

        Ok(Self {
            code: RequestCode::Delete,
            body,
        })
    }

    /// Call a stored function. `args` must serialize to an array or `()`.
    pub fn call<A: Serialize + ?Sized>(function: &str, args: &A) -> Result<Self> {
        let body = BodyBuilder::new(2)
            .value(keys::FUNCTION_NAME, function)?
            .raw(keys::TUPLE, &encode_args(args)?)
            .finish();

        Ok(Self {
            code: RequestCode::Call,
            body,
        })
    }

    /// Evaluate an expression on the server. `args` as for [`call`](Self::call).
    pub fn eval<A: Serialize + ?Sized>(expression: &str, args: &A) -> Result<Self> {
        let body = BodyBuilder::new(2)
            .value(keys::EXPRESSION, expression)?
            .raw(keys::TUPLE, &encode_args(args)?)
            .finish();

        Ok(Self {
            code: RequestCode::Eval,
            body,
        })
    }

    /// Authenticate `username` with a precomputed scramble.
    ///
    /// The credential tuple is `[mechanism, scramble]`, the scramble sent as
    /// a 20-byte fixstr.
    pub fn auth(username: &str, scramble: &[u8; SCRAMBLE_SIZE]) -> Result<Self> {
        let mut credentials = Vec::with_capacity(2 + AUTH_MECHANISM.len() + 1 + SCRAMBLE_SIZE);
        credentials.push(0x92);
        credentials.extend(MsgPackCodec::encode(AUTH_MECHANISM)?);
        credentials.push(0xa0 | SCRAMBLE_SIZE as u8);
        credentials.extend_from_slice(scramble);

        let body = BodyBuilder::new(2)
            .value(keys::USERNAME, username)?
            .raw(keys::TUPLE, &credentials)
            .finish();

        Ok(Self {
            code: RequestCode::Auth,
            body,
        })
    }

    /// Operation code of this request.
    #[inline]
    pub fn code(&self) -> RequestCode {
        self.code
    }

    /// Encoded body map.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Build the complete frame for correlation id `sync`.
    pub fn encode(&self, sync: u32) -> Bytes {
        build_frame(self.code, sync, &self.body)
    }
}

/// Build a complete frame: length prefix, header map, body map.
pub fn build_frame(code: RequestCode, sync: u32, body: &[u8]) -> Bytes {
    let length = REQUEST_HEADER_SIZE + body.len();
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + length);
    buf.put_slice(&encode_length_prefix(length as u32));
    buf.put_slice(&encode_request_header(code, sync));
    buf.put_slice(body);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmpv::Value;

    /// Decode a body map into (key, value) pairs.
    fn body_entries(request: &Request) -> Vec<(u64, Value)> {
        let value = MsgPackCodec::decode_value(request.body()).unwrap();
        value
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.as_u64().unwrap(), v.clone()))
            .collect()
    }

    #[test]
    fn test_ping_frame_bytes() {
        let frame = Request::ping().encode(1);
        assert_eq!(
            &frame[..],
            &[0xce, 0, 0, 0, 10, 0x82, 0x00, 0x40, 0x01, 0xce, 0, 0, 0, 1, 0x80]
        );
    }

    #[test]
    fn test_length_prefix_covers_header_and_body() {
        let request = Request::call("box.info", &Vec::<u8>::new()).unwrap();
        let frame = request.encode(99);

        let declared = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
        assert_eq!(declared, frame.len() - LENGTH_PREFIX_SIZE);
    }

    #[test]
    fn test_select_body() {
        let request = Request::select(512, 0, 10, 5, IteratorType::Ge, &(3u32,)).unwrap();
        assert_eq!(request.code(), RequestCode::Select);
        assert_eq!(
            body_entries(&request),
            vec![
                (keys::SPACE_ID as u64, Value::from(512)),
                (keys::INDEX_ID as u64, Value::from(0)),
                (keys::LIMIT as u64, Value::from(10)),
                (keys::OFFSET as u64, Value::from(5)),
                (keys::ITERATOR as u64, Value::from(5)),
                (keys::KEY as u64, Value::Array(vec![Value::from(3)])),
            ]
        );
    }

    #[test]
    fn test_insert_and_replace_bodies() {
        for (request, code) in [
            (Request::insert(600, &(1, "a")).unwrap(), RequestCode::Insert),
            (Request::replace(600, &(1, "a")).unwrap(), RequestCode::Replace),
        ] {
            assert_eq!(request.code(), code);
            assert_eq!(
                body_entries(&request),
                vec![
                    (keys::SPACE_ID as u64, Value::from(600)),
                    (
                        keys::TUPLE as u64,
                        Value::Array(vec![Value::from(1), Value::from("a")])
                    ),
                ]
            );
        }
    }

    #[test]
    fn test_non_array_tuple_rejected() {
        let err = Request::insert(600, &42).unwrap_err();
        assert!(matches!(err, TarantoolError::Validation(_)));

        let err = Request::replace(600, "text").unwrap_err();
        assert!(matches!(err, TarantoolError::Validation(_)));
    }

    #[test]
    fn test_update_body_and_validation() {
        let ops = vec![("=", 1, "b")];
        let request = Request::update(600, 0, &(1,), &ops).unwrap();
        let entries = body_entries(&request);

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[2].0, keys::KEY as u64);
        assert_eq!(entries[3].0, keys::TUPLE as u64);
        assert_eq!(
            entries[3].1,
            Value::Array(vec![Value::Array(vec![
                Value::from("="),
                Value::from(1),
                Value::from("b"),
            ])])
        );

        let err = Request::update(600, 0, &(1,), &"=").unwrap_err();
        assert!(err.to_string().contains("must be an array"));
    }

    #[test]
    fn test_delete_declares_three_entries() {
        let request = Request::delete(600, 1, &(7,)).unwrap();
        assert_eq!(request.body()[0], 0x83);
        assert_eq!(body_entries(&request).len(), 3);
    }

    #[test]
    fn test_call_and_eval_bodies() {
        let call = Request::call("echo", &("x",)).unwrap();
        assert_eq!(call.code(), RequestCode::Call);
        assert_eq!(body_entries(&call)[0], (keys::FUNCTION_NAME as u64, Value::from("echo")));

        let eval = Request::eval("return ...", &(1, 2)).unwrap();
        assert_eq!(eval.code(), RequestCode::Eval);
        assert_eq!(
            body_entries(&eval)[0],
            (keys::EXPRESSION as u64, Value::from("return ..."))
        );
    }

    #[test]
    fn test_unit_args_become_empty_array() {
        let call = Request::call("box.info", &()).unwrap();
        assert_eq!(body_entries(&call)[1], (keys::TUPLE as u64, Value::Array(vec![])));

        let err = Request::eval("return 1", &5).unwrap_err();
        assert!(matches!(err, TarantoolError::Validation(_)));
    }

    #[test]
    fn test_auth_body() {
        let scramble = [0xabu8; SCRAMBLE_SIZE];
        let request = Request::auth("guest", &scramble).unwrap();
        let entries = body_entries(&request);

        assert_eq!(entries[0], (keys::USERNAME as u64, Value::from("guest")));
        assert_eq!(entries[1].0, keys::TUPLE as u64);

        // [ "chap-sha1", fixstr(20) ] followed by the raw scramble bytes
        let body = request.body();
        let tail = &body[body.len() - SCRAMBLE_SIZE - 1..];
        assert_eq!(tail[0], 0xb4);
        assert_eq!(&tail[1..], &scramble);
    }
}
