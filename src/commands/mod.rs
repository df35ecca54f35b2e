//! Command Model
//!
//! Every supported command is a value implementing [`Command`]. Turning a
//! token array into one is a registry lookup followed by the command's own
//! parse function:
//!
//! ```text
//!   ["ZADD", "board", "1", "alice"]
//!        │
//!        ▼
//!   registry["zadd"] ──> ZAdd::parse(Base) ──> Box<dyn Command>
//!                               │                     │
//!                         Error (reported,            │ run(writer, tx)
//!                         never executed)             ▼
//!                                              reply written, RespValue returned
//! ```
//!
//! Commands never see the session: `run` takes a [`Writer`] and a [`Tx`],
//! so the same value executes alone or as part of an EXEC batch.

pub mod error;
pub mod hash;
pub mod key;
pub mod list;
pub mod server;
pub mod set;
pub mod string;
pub mod zset;

pub use error::Error;

use crate::protocol::{RespValue, Writer};
use crate::storage::Tx;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error as ThisError;

/// Name and raw arguments shared by every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base {
    name: String,
    args: Vec<Bytes>,
}

impl Base {
    /// `name` is lowercased.
    pub fn new(name: &[u8], args: Vec<Bytes>) -> Self {
        Self {
            name: String::from_utf8_lossy(name).to_lowercase(),
            args,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }
}

/// Session-level commands the connection handles itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Multi,
    Exec,
    Discard,
    Monitor,
    Quit,
}

/// A parsed, ready-to-run command.
pub trait Command: fmt::Debug + Send + Sync {
    fn base(&self) -> &Base;

    /// Performs the operation and returns its reply.
    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error>;

    /// Set for the session-level commands only.
    fn control(&self) -> Option<Control> {
        None
    }

    fn name(&self) -> &str {
        self.base().name()
    }

    /// The arguments, space-joined.
    fn source_text(&self) -> String {
        self.base()
            .args()
            .iter()
            .map(|arg| String::from_utf8_lossy(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The error line a client sees for `err`.
    fn describe_error(&self, err: &Error) -> String {
        format!("{} ({})", err, self.name())
    }

    /// Executes the command and writes its reply (or error) to `w`.
    fn run(&self, w: &mut dyn Writer, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        match self.exec(tx) {
            Ok(value) => {
                w.write_value(&value);
                Ok(value)
            }
            Err(err) => {
                w.write_error(&self.describe_error(&err));
                Err(err)
            }
        }
    }
}

/// Implements [`Command::base`] for a struct with a `base` field.
macro_rules! base {
    () => {
        fn base(&self) -> &$crate::commands::Base {
            &self.base
        }
    };
}
pub(crate) use base;

/// A token array that did not parse into a command.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{error} ({name})")]
pub struct InvalidCommand {
    pub name: String,
    pub error: Error,
}

pub(crate) type ParseFn = fn(Base) -> Result<Box<dyn Command>, Error>;

fn registry() -> &'static HashMap<&'static str, ParseFn> {
    static REGISTRY: OnceLock<HashMap<&'static str, ParseFn>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut r: HashMap<&'static str, ParseFn> = HashMap::new();
        server::register(&mut r);
        key::register(&mut r);
        string::register(&mut r);
        list::register(&mut r);
        hash::register(&mut r);
        set::register(&mut r);
        zset::register(&mut r);
        r
    })
}

/// Returns true if `name` (lowercase) is a known command.
pub fn is_known(name: &str) -> bool {
    registry().contains_key(name)
}

/// Every registered command name, sorted.
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = registry().keys().copied().collect();
    names.sort_unstable();
    names
}

/// Parses a token array (`[name, args...]`) into a command.
pub fn parse(tokens: Vec<Bytes>) -> Result<Box<dyn Command>, InvalidCommand> {
    let mut tokens = tokens.into_iter();
    let name = tokens.next().unwrap_or_default();
    let base = Base::new(&name, tokens.collect());

    let Some(parse) = registry().get(base.name()) else {
        return Err(InvalidCommand {
            name: base.name,
            error: Error::UnknownCmd,
        });
    };

    let name = base.name.clone();
    parse(base).map_err(|error| InvalidCommand { name, error })
}
