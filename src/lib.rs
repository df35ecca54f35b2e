//! # relkv - A Redis-Compatible Server over a Transactional Store
//!
//! relkv speaks RESP2 and executes Redis commands against a row-oriented,
//! transactional keyspace. Every command is a typed value produced by a
//! small parser-combinator framework, and every command runs inside a store
//! transaction, so MULTI/EXEC batches are all-or-nothing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               relkv                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Session    │──> MONITOR        │
//! │  │ (Listener)  │    │  Handler    │    │ MULTI/EXEC  │    subscribers    │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │ commands::parse         │
//! │                            ▼                  ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │   RESP      │    │  Command (args::Parser) ── run(writer, tx)   │   │
//! │  │ Parser and  │    └──────────────────────┬───────────────────────┘   │
//! │  │  Writer     │                           ▼                           │
//! │  └─────────────┘    ┌──────────────────────────────────────────────┐   │
//! │                     │  Db ── Tx: key str list hash set zset        │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use relkv::connection::{handle_connection, Shared};
//! use relkv::storage::{start_expiry_sweeper, Db};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let db = Arc::new(Db::new());
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&db));
//!     let shared = Shared::new(db);
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await.unwrap();
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         tokio::spawn(handle_connection(stream, addr, shared.clone()));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`args`]: parser combinators for command arguments
//! - [`commands`]: the command model, registry and every command
//! - [`connection`]: socket handling, sessions and MONITOR
//! - [`protocol`]: RESP parser, reply values and the writer
//! - [`storage`]: the transactional keyspace and its typed repositories

pub mod args;
pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::{parse, Command};
pub use connection::{handle_connection, ConnectionStats, Shared};
pub use protocol::{ParseError, RespParser, RespValue, RespWriter, Writer};
pub use storage::{start_expiry_sweeper, Db, ExpiryConfig, ExpirySweeper};

/// The default port relkv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host relkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of relkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
