//! RESP Data Types
//!
//! Every RESP2 frame starts with a one-byte type prefix and ends with CRLF:
//!
//! ```text
//!   +OK\r\n                      simple string
//!   -ERR syntax error\r\n        error
//!   :1000\r\n                    integer
//!   $5\r\nhello\r\n              bulk string    ($-1\r\n is null)
//!   *2\r\n$3\r\nGET\r\n$1\r\nk\r\n  array      (*-1\r\n is null)
//! ```
//!
//! [`RespValue`] is used both for decoded request frames and as the
//! structured result of running a command.

use crate::protocol::writer::{RespWriter, Writer};
use bytes::Bytes;
use std::fmt;

pub const CRLF: &[u8] = b"\r\n";

/// RESP type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A RESP2 value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status reply, must not contain CR or LF
    SimpleString(String),
    Error(String),
    Integer(i64),
    /// Binary-safe string
    BulkString(Bytes),
    /// Null bulk string
    Null,
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// A float, sent as a bulk string the way RESP2 servers do.
    pub fn float(f: f64) -> Self {
        RespValue::BulkString(Bytes::from(format_float(f)))
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// An array of bulk strings.
    pub fn bulk_array<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        RespValue::Array(items.into_iter().map(RespValue::bulk_string).collect())
    }

    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn queued() -> Self {
        RespValue::SimpleString("QUEUED".to_string())
    }

    /// Encodes the value into a fresh buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut w = RespWriter::new();
        w.write_value(self);
        w.into_bytes().to_vec()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Returns the contents of a simple or bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            RespValue::BulkString(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

impl From<i64> for RespValue {
    fn from(n: i64) -> Self {
        RespValue::Integer(n)
    }
}

impl From<usize> for RespValue {
    fn from(n: usize) -> Self {
        RespValue::Integer(n as i64)
    }
}

impl From<bool> for RespValue {
    fn from(b: bool) -> Self {
        RespValue::Integer(b as i64)
    }
}

impl From<Bytes> for RespValue {
    fn from(b: Bytes) -> Self {
        RespValue::BulkString(b)
    }
}

impl From<Option<Bytes>> for RespValue {
    fn from(b: Option<Bytes>) -> Self {
        b.map_or(RespValue::Null, RespValue::BulkString)
    }
}

impl From<Vec<Bytes>> for RespValue {
    fn from(items: Vec<Bytes>) -> Self {
        RespValue::bulk_array(items)
    }
}

impl From<Vec<Option<Bytes>>> for RespValue {
    fn from(items: Vec<Option<Bytes>>) -> Self {
        RespValue::Array(items.into_iter().map(RespValue::from).collect())
    }
}

/// Formats a float the way replies carry it: integral values without a
/// fractional part, infinities as `inf` / `-inf`.
pub fn format_float(f: f64) -> String {
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    f.to_string()
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) if values.is_empty() => write!(f, "(empty array)"),
            RespValue::Array(values) => {
                for (i, v) in values.iter().enumerate() {
                    writeln!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_scalars() {
        assert_eq!(RespValue::ok().serialize(), b"+OK\r\n");
        assert_eq!(RespValue::error("ERR syntax error").serialize(), b"-ERR syntax error\r\n");
        assert_eq!(RespValue::integer(-42).serialize(), b":-42\r\n");
        assert_eq!(RespValue::bulk_string("hello").serialize(), b"$5\r\nhello\r\n");
        assert_eq!(RespValue::null().serialize(), b"$-1\r\n");
    }

    #[test]
    fn test_serialize_nested_array() {
        let value = RespValue::array(vec![
            RespValue::integer(1),
            RespValue::array(vec![RespValue::integer(2), RespValue::Null]),
        ]);
        assert_eq!(value.serialize(), b"*2\r\n:1\r\n*2\r\n:2\r\n$-1\r\n");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(RespValue::from(true), RespValue::Integer(1));
        assert_eq!(RespValue::from(3usize), RespValue::Integer(3));
        assert_eq!(RespValue::from(None::<Bytes>), RespValue::Null);
        assert_eq!(
            RespValue::from(vec![Some(Bytes::from("a")), None]),
            RespValue::array(vec![RespValue::bulk_string("a"), RespValue::Null])
        );
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.0), "1");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
        assert_eq!(RespValue::float(0.5), RespValue::bulk_string("0.5"));
    }
}
