//! Client Connections
//!
//! Each accepted socket is served by its own task. Sessions are per
//! connection; the store, the MONITOR registry and the counters are shared.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener (main.rs)                  │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept() + spawn
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ Parse RESP  │───>│  Session    │     │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘     │
//! │                            │                  │ Db         │
//! │                            ▼                  ▼            │
//! │                     ┌─────────────┐    ┌─────────────┐     │
//! │                     │  Monitor    │    │ Reply buffer│     │
//! │                     │  broadcast  │    └─────────────┘     │
//! │                     └─────────────┘                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - `handler`: socket loop, pipelining, `ConnectionStats`
//! - `session`: MULTI/EXEC/DISCARD state machine
//! - `monitor`: MONITOR subscriber registry and line format
//!
//! ## Example
//!
//! ```ignore
//! use relkv::connection::{handle_connection, Shared};
//! use relkv::storage::Db;
//! use std::sync::Arc;
//!
//! let shared = Shared::new(Arc::new(Db::new()));
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, shared.clone()));
//! ```

pub mod handler;
pub mod monitor;
pub mod session;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, Shared};
pub use monitor::{Monitor, Subscription};
pub use session::{Outcome, Session};
