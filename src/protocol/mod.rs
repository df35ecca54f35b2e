//! RESP Protocol
//!
//! - `types`: [`RespValue`], the frame and reply value
//! - `parser`: incremental decoder, request frames to token arrays
//! - `writer`: the [`Writer`] reply contract and its RESP2 implementation
//!
//! ## Example
//!
//! ```
//! use relkv::protocol::{RespParser, RespWriter, Writer};
//!
//! let (tokens, _) = RespParser::new()
//!     .parse_command(b"*1\r\n$4\r\nPING\r\n")
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(tokens, vec!["PING"]);
//!
//! let mut w = RespWriter::new();
//! w.write_string("PONG");
//! assert_eq!(w.as_bytes(), b"+PONG\r\n");
//! ```

pub mod parser;
pub mod types;
pub mod writer;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::{format_float, RespValue};
pub use writer::{RespWriter, Writer};
