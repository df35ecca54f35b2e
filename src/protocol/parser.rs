//! Incremental RESP Parser
//!
//! The parser works on whatever bytes have arrived so far and never blocks.
//! Each call returns one of:
//!
//! - `Ok(Some((frame, consumed)))` - a complete frame; advance by `consumed`
//! - `Ok(None)` - the frame is not complete yet; read more and retry
//! - `Err(ParseError)` - the stream is malformed
//!
//! Lines that do not start with a RESP prefix are inline commands
//! (`PING\r\n`, `SET k v\r\n`), split on ASCII whitespace.
//!
//! Requests are arrays of strings. [`RespParser::parse_command`] decodes a
//! frame and flattens it into the token array a command is parsed from.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Malformed RESP input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid UTF-8 in status line")]
    InvalidUtf8,

    #[error("invalid length: {0}")]
    InvalidLength(i64),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("frame too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    /// The frame is valid RESP but not an array of strings
    #[error("expected a command array")]
    NotACommand,
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Largest accepted bulk string
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Deepest accepted array nesting
pub const MAX_NESTING_DEPTH: usize = 32;

type Parsed = ParseResult<Option<(RespValue, usize)>>;

/// Incremental RESP2 decoder.
///
/// ```
/// use relkv::protocol::RespParser;
///
/// let mut parser = RespParser::new();
/// let (tokens, used) = parser
///     .parse_command(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
///     .unwrap()
///     .unwrap();
/// assert_eq!(tokens, vec!["GET", "name"]);
/// assert_eq!(used, 23);
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    depth: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Decodes one frame from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> Parsed {
        self.depth = 0;
        self.value(buf)
    }

    /// Decodes one request frame into its token array.
    ///
    /// An empty inline line yields an empty token array.
    pub fn parse_command(&mut self, buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        match self.parse(buf)? {
            Some((frame, consumed)) => Ok(Some((into_tokens(frame)?, consumed))),
            None => Ok(None),
        }
    }

    fn value(&mut self, buf: &[u8]) -> Parsed {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::Protocol(format!(
                "nesting deeper than {}",
                MAX_NESTING_DEPTH
            )));
        }

        match first {
            prefix::SIMPLE_STRING => status(buf).map(|o| o.map(|(s, n)| (RespValue::SimpleString(s), n))),
            prefix::ERROR => status(buf).map(|o| o.map(|(s, n)| (RespValue::Error(s), n))),
            prefix::INTEGER => match header(buf)? {
                Some((n, used)) => Ok(Some((RespValue::Integer(n), used))),
                None => Ok(None),
            },
            prefix::BULK_STRING => bulk(buf),
            prefix::ARRAY => self.array(buf),
            _ => inline(buf),
        }
    }

    fn array(&mut self, buf: &[u8]) -> Parsed {
        let Some((count, mut consumed)) = header(buf)? else {
            return Ok(None);
        };
        if count == -1 {
            return Ok(Some((RespValue::Null, consumed)));
        }
        if count < 0 {
            return Err(ParseError::InvalidLength(count));
        }

        self.depth += 1;
        let mut items = Vec::with_capacity((count as usize).min(1024));
        for _ in 0..count {
            match self.value(&buf[consumed..])? {
                Some((item, used)) => {
                    items.push(item);
                    consumed += used;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(items), consumed)))
    }
}

/// Parses `+...\r\n` / `-...\r\n`, returning the text after the prefix.
fn status(buf: &[u8]) -> ParseResult<Option<(String, usize)>> {
    let Some(end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let text = std::str::from_utf8(&buf[1..1 + end]).map_err(|_| ParseError::InvalidUtf8)?;
    Ok(Some((text.to_string(), end + 3)))
}

/// Parses the integer in a `:n\r\n`, `$n\r\n` or `*n\r\n` line.
fn header(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let Some(end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let digits = &buf[1..1 + end];
    let n = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ParseError::InvalidInteger(String::from_utf8_lossy(digits).into_owned()))?;
    Ok(Some((n, end + 3)))
}

fn bulk(buf: &[u8]) -> Parsed {
    let Some((len, start)) = header(buf)? else {
        return Ok(None);
    };
    if len == -1 {
        return Ok(Some((RespValue::Null, start)));
    }
    if len < 0 {
        return Err(ParseError::InvalidLength(len));
    }

    let len = len as usize;
    if len > MAX_BULK_SIZE {
        return Err(ParseError::TooLarge {
            size: len,
            max: MAX_BULK_SIZE,
        });
    }

    let end = start + len;
    if buf.len() < end + 2 {
        return Ok(None);
    }
    if &buf[end..end + 2] != CRLF {
        return Err(ParseError::Protocol("bulk string not terminated by CRLF".to_string()));
    }

    Ok(Some((
        RespValue::BulkString(Bytes::copy_from_slice(&buf[start..end])),
        end + 2,
    )))
}

fn inline(buf: &[u8]) -> Parsed {
    let Some(end) = find_crlf(buf) else {
        return Ok(None);
    };
    let items = buf[..end]
        .split(|b| b.is_ascii_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| RespValue::BulkString(Bytes::copy_from_slice(word)))
        .collect();
    Ok(Some((RespValue::Array(items), end + 2)))
}

/// Flattens a request frame into tokens.
fn into_tokens(frame: RespValue) -> ParseResult<Vec<Bytes>> {
    let RespValue::Array(items) = frame else {
        return Err(ParseError::NotACommand);
    };
    items
        .into_iter()
        .map(|item| match item {
            RespValue::BulkString(b) => Ok(b),
            RespValue::SimpleString(s) => Ok(Bytes::from(s)),
            RespValue::Integer(n) => Ok(Bytes::from(n.to_string())),
            _ => Err(ParseError::NotACommand),
        })
        .collect()
}

/// Position of the first CRLF in `buf`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Decodes a single frame with a fresh parser.
pub fn parse_message(buf: &[u8]) -> Parsed {
    RespParser::new().parse(buf)
}
