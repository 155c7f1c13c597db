//! Protocol constants: request opcodes, body key codes, select iterators
//! and the authentication mechanism tag.
//!
//! All key codes and opcodes are below 0x80, so each one encodes as a single
//! MsgPack positive fixint byte.

use std::fmt;
use std::str::FromStr;

use crate::error::TarantoolError;

/// Operation code carried in the `code` field of a request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestCode {
    Select = 0x01,
    Insert = 0x02,
    Replace = 0x03,
    Update = 0x04,
    Delete = 0x05,
    Call = 0x06,
    Auth = 0x07,
    Eval = 0x08,
    Ping = 0x40,
}

impl RequestCode {
    /// Wire value of this opcode.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Map keys used in request/response headers and bodies.
pub mod keys {
    pub const CODE: u8 = 0x00;
    pub const SYNC: u8 = 0x01;
    pub const SCHEMA_VERSION: u8 = 0x05;
    pub const SPACE_ID: u8 = 0x10;
    pub const INDEX_ID: u8 = 0x11;
    pub const LIMIT: u8 = 0x12;
    pub const OFFSET: u8 = 0x13;
    pub const ITERATOR: u8 = 0x14;
    pub const KEY: u8 = 0x20;
    pub const TUPLE: u8 = 0x21;
    pub const FUNCTION_NAME: u8 = 0x22;
    pub const USERNAME: u8 = 0x23;
    pub const EXPRESSION: u8 = 0x27;
    pub const DATA: u8 = 0x30;
    pub const ERROR: u8 = 0x31;
}

/// Authentication mechanism named in the auth credential tuple.
pub const AUTH_MECHANISM: &str = "chap-sha1";

/// Index iterator used by `select`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum IteratorType {
    #[default]
    Eq = 0,
    Req = 1,
    All = 2,
    Lt = 3,
    Le = 4,
    Ge = 5,
    Gt = 6,
    BitsAllSet = 7,
    BitsAnySet = 8,
    BitsAllNotSet = 9,
    Overlaps = 10,
    Neighbor = 11,
}

/// Iterator name lookup table.
const ITERATOR_NAMES: [(&str, IteratorType); 12] = [
    ("eq", IteratorType::Eq),
    ("req", IteratorType::Req),
    ("all", IteratorType::All),
    ("lt", IteratorType::Lt),
    ("le", IteratorType::Le),
    ("ge", IteratorType::Ge),
    ("gt", IteratorType::Gt),
    ("bitsAllSet", IteratorType::BitsAllSet),
    ("bitsAnySet", IteratorType::BitsAnySet),
    ("bitsAllNotSet", IteratorType::BitsAllNotSet),
    ("overlaps", IteratorType::Overlaps),
    ("neighbor", IteratorType::Neighbor),
];

impl IteratorType {
    /// Wire value of this iterator.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Name used in the lookup table.
    pub fn name(self) -> &'static str {
        ITERATOR_NAMES[self as usize].0
    }
}

impl fmt::Display for IteratorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IteratorType {
    type Err = TarantoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ITERATOR_NAMES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, iterator)| *iterator)
            .ok_or_else(|| TarantoolError::Validation(format!("unknown iterator: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcodes_fit_fixint() {
        for code in [
            RequestCode::Select,
            RequestCode::Insert,
            RequestCode::Replace,
            RequestCode::Update,
            RequestCode::Delete,
            RequestCode::Call,
            RequestCode::Auth,
            RequestCode::Eval,
            RequestCode::Ping,
        ] {
            assert!(code.code() < 0x80);
        }
        assert_eq!(RequestCode::Ping.code(), 64);
    }

    #[test]
    fn test_iterator_lookup() {
        assert_eq!("eq".parse::<IteratorType>().unwrap(), IteratorType::Eq);
        assert_eq!("all".parse::<IteratorType>().unwrap().code(), 2);
        assert_eq!("bitsAnySet".parse::<IteratorType>().unwrap().code(), 8);
        assert_eq!("neighbor".parse::<IteratorType>().unwrap().code(), 11);
    }

    #[test]
    fn test_iterator_names_match_codes() {
        for (index, (name, iterator)) in ITERATOR_NAMES.iter().enumerate() {
            assert_eq!(iterator.code() as usize, index);
            assert_eq!(iterator.name(), *name);
        }
    }

    #[test]
    fn test_unknown_iterator_rejected() {
        let err = "sideways".parse::<IteratorType>().unwrap_err();
        assert!(err.to_string().contains("unknown iterator"));
    }
}
