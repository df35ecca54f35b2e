//! Storage Module
//!
//! A single keyspace of typed values behind one transactional engine.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                         Db                                │
//! │   RwLock<Rows<Entry>>      commits / rollbacks / expired  │
//! └───────────────┬───────────────────────────────────────────┘
//!                 │ update(|tx| ...)
//!                 ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                         Tx                                │
//! │  key()  str()  list()  hash()  set()  zset()              │
//! │  undo journal (rollback on Err)                           │
//! └───────────────────────────────────────────────────────────┘
//!                 ▲
//!                 │ delete_expired()
//!        ┌────────┴────────┐
//!        │  ExpirySweeper  │
//!        └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use relkv::storage::{Db, RangeCmd};
//! use bytes::Bytes;
//!
//! let db = Db::new();
//! let board = Bytes::from("board");
//!
//! let top = db.update(|tx| {
//!     tx.zset().add(&board, Bytes::from("alice"), 30.0)?;
//!     tx.zset().add(&board, Bytes::from("bob"), 10.0)?;
//!     tx.zset().range(&board, RangeCmd::by_rank(0, 0).desc())
//! }).unwrap();
//!
//! assert_eq!(top[0].member, Bytes::from("alice"));
//! ```

pub mod engine;
pub mod error;
pub mod expiry;
pub mod glob;
pub mod hash;
pub mod key;
pub mod list;
pub mod rows;
pub mod set;
pub mod string;
pub mod zset;

pub use engine::{unix_millis, Db, Entry, KeyType, StorageStats, Tx, Value};
pub use error::{Error, Result};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
pub use glob::Glob;
pub use key::{KeyInfo, Ttl};
pub use list::Position;
pub use rows::{ScanResult, DEFAULT_SCAN_COUNT};
pub use string::{SetOptions, SetOut};
pub use zset::{Aggregate, By, Combine, RangeCmd, SetItem, SortOrder};
