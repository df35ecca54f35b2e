//! Protocol-visible errors.
//!
//! The display strings are what clients see, before the command name is
//! appended (`ERR syntax error (set)`).

use crate::storage;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("ERR wrong number of arguments")]
    InvalidArgNum,

    #[error("ERR invalid cursor")]
    InvalidCursor,

    #[error("ERR invalid expire time")]
    InvalidExpireTime,

    #[error("ERR value is not a float")]
    InvalidFloat,

    #[error("ERR value is not an integer")]
    InvalidInt,

    #[error("ERR MULTI calls can not be nested")]
    NestedMulti,

    #[error("ERR no such key")]
    NotFound,

    #[error("ERR EXEC without MULTI")]
    NotInMulti,

    /// Fills the EXEC slots after a failed queued command
    #[error("ERR transaction aborted")]
    ExecAborted,

    #[error("ERR Command not allowed inside a transaction")]
    NotAllowedInMulti,

    #[error("ERR index out of range")]
    OutOfRange,

    #[error("ERR syntax error")]
    SyntaxError,

    #[error("ERR unknown command")]
    UnknownCmd,

    #[error("ERR unknown subcommand")]
    UnknownSubcmd,

    #[error("ERR Replica can't interact with the keyspace")]
    ReplicaKeyspace,

    /// A domain error from the storage layer
    #[error("ERR {0}")]
    Storage(storage::Error),
}

impl From<storage::Error> for Error {
    fn from(err: storage::Error) -> Self {
        match err {
            storage::Error::NotFound => Error::NotFound,
            other => Error::Storage(other),
        }
    }
}
