//! Reply encoding.
//!
//! Commands never build wire bytes themselves; they talk to a [`Writer`].
//! [`RespWriter`] is the RESP2 implementation used by connections. It
//! appends to a `BytesMut` so that every reply produced by one read of
//! pipelined commands goes out in a single socket write.

use crate::protocol::types::{format_float, prefix, RespValue, CRLF};
use bytes::{BufMut, Bytes, BytesMut};

/// Primitive reply operations.
pub trait Writer {
    fn write_int(&mut self, n: i64);

    fn write_bulk(&mut self, data: &[u8]);

    fn write_bulk_string(&mut self, s: &str) {
        self.write_bulk(s.as_bytes());
    }

    /// Writes an array header; the caller writes `len` elements after it.
    fn write_array(&mut self, len: usize);

    /// Writes a status reply.
    fn write_string(&mut self, s: &str);

    fn write_null(&mut self);

    fn write_error(&mut self, msg: &str);

    /// Writes pre-encoded bytes as-is.
    fn write_raw(&mut self, data: &[u8]);

    fn write_float(&mut self, f: f64) {
        self.write_bulk_string(&format_float(f));
    }

    fn write_value(&mut self, value: &RespValue) {
        match value {
            RespValue::SimpleString(s) => self.write_string(s),
            RespValue::Error(s) => self.write_error(s),
            RespValue::Integer(n) => self.write_int(*n),
            RespValue::BulkString(data) => self.write_bulk(data),
            RespValue::Null => self.write_null(),
            RespValue::Array(values) => {
                self.write_array(values.len());
                for v in values {
                    self.write_value(v);
                }
            }
        }
    }
}

/// RESP2 writer over an in-memory buffer.
#[derive(Debug, Default)]
pub struct RespWriter {
    buf: BytesMut,
}

impl RespWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Takes everything written so far, leaving the writer empty.
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    fn line(&mut self, prefix: u8, body: &[u8]) {
        self.buf.reserve(body.len() + 3);
        self.buf.put_u8(prefix);
        self.buf.put_slice(body);
        self.buf.put_slice(CRLF);
    }
}

impl Writer for RespWriter {
    fn write_int(&mut self, n: i64) {
        self.line(prefix::INTEGER, n.to_string().as_bytes());
    }

    fn write_bulk(&mut self, data: &[u8]) {
        self.line(prefix::BULK_STRING, data.len().to_string().as_bytes());
        self.buf.put_slice(data);
        self.buf.put_slice(CRLF);
    }

    fn write_array(&mut self, len: usize) {
        self.line(prefix::ARRAY, len.to_string().as_bytes());
    }

    fn write_string(&mut self, s: &str) {
        self.line(prefix::SIMPLE_STRING, s.as_bytes());
    }

    fn write_null(&mut self) {
        self.line(prefix::BULK_STRING, b"-1");
    }

    fn write_error(&mut self, msg: &str) {
        // CR/LF would break framing
        let msg: String = msg.chars().map(|c| if c == '\r' || c == '\n' { ' ' } else { c }).collect();
        self.line(prefix::ERROR, msg.as_bytes());
    }

    fn write_raw(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }
}
