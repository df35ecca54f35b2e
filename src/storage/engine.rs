//! Transactional Storage Engine
//!
//! This module implements the keyspace and its transaction boundary. Every
//! read and write goes through a [`Tx`], obtained from [`Db::update`]. A
//! transaction holds the keyspace write lock for its whole lifetime, so
//! transactions are serialized against each other.
//!
//! ## Rollback
//!
//! Before a key is modified for the first time inside a transaction, its
//! current row (id and value) is copied into an undo journal. If the closure
//! passed to `update` returns an error, the journal is replayed in reverse
//! and the keyspace is restored exactly, row ids included:
//!
//! ```text
//!   update(|tx| ...)
//!        │
//!        ├── tx.get_mut("a")  ──> journal: [a = (id 3, "1")]
//!        ├── tx.put("b", ..)  ──> journal: [a = (id 3, "1"), b = absent]
//!        │
//!        ├── Ok  ──> drop journal (commit)
//!        └── Err ──> b removed, a restored under id 3 (rollback)
//! ```
//!
//! ## Expiry
//!
//! Keys carry an optional absolute expiry in unix milliseconds. Expired keys
//! are invisible to reads ("lazy" expiry) and are evicted when a write
//! touches them or when the background sweeper runs.

use crate::storage::error::{Error, Result};
use crate::storage::hash::Hashes;
use crate::storage::key::Keys;
use crate::storage::list::Lists;
use crate::storage::rows::Rows;
use crate::storage::set::Sets;
use crate::storage::string::Strings;
use crate::storage::zset::SortedSets;
use bytes::Bytes;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// List values.
pub type List = VecDeque<Bytes>;
/// Hash values: field -> value.
pub type Hash = Rows<Bytes>;
/// Set values: member -> ().
pub type Set = Rows<()>;
/// Sorted set values: member -> score.
pub type ZSet = Rows<f64>;

/// The type of value stored under a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    String,
    List,
    Hash,
    Set,
    ZSet,
}

impl KeyType {
    /// Returns the name TYPE reports for this key type.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::String => "string",
            KeyType::List => "list",
            KeyType::Hash => "hash",
            KeyType::Set => "set",
            KeyType::ZSet => "zset",
        }
    }

    /// Parses a type name (case-insensitive), as used by `SCAN ... TYPE`.
    pub fn parse(name: &[u8]) -> Option<Self> {
        [
            KeyType::String,
            KeyType::List,
            KeyType::Hash,
            KeyType::Set,
            KeyType::ZSet,
        ]
        .into_iter()
        .find(|kind| kind.as_str().as_bytes().eq_ignore_ascii_case(name))
    }
}

/// A value of any supported type.
#[derive(Debug, Clone)]
pub enum Value {
    Str(Bytes),
    List(List),
    Hash(Hash),
    Set(Set),
    ZSet(ZSet),
}

impl Value {
    pub fn kind(&self) -> KeyType {
        match self {
            Value::Str(_) => KeyType::String,
            Value::List(_) => KeyType::List,
            Value::Hash(_) => KeyType::Hash,
            Value::Set(_) => KeyType::Set,
            Value::ZSet(_) => KeyType::ZSet,
        }
    }

    /// Returns true for collections with no elements left.
    /// Strings are never considered empty.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::Str(_) => false,
            Value::List(list) => list.is_empty(),
            Value::Hash(hash) => hash.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::ZSet(zset) => zset.is_empty(),
        }
    }
}

/// Maps a Rust representation onto its [`Value`] variant.
pub trait Typed: Sized + Default {
    const KIND: KeyType;

    fn of(value: &Value) -> Option<&Self>;
    fn of_mut(value: &mut Value) -> Option<&mut Self>;
    fn into_value(self) -> Value;
}

macro_rules! typed {
    ($ty:ty, $variant:ident, $kind:expr) => {
        impl Typed for $ty {
            const KIND: KeyType = $kind;

            fn of(value: &Value) -> Option<&Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn of_mut(value: &mut Value) -> Option<&mut Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }
    };
}

typed!(Bytes, Str, KeyType::String);
typed!(List, List, KeyType::List);
typed!(Hash, Hash, KeyType::Hash);
typed!(Set, Set, KeyType::Set);
typed!(ZSet, ZSet, KeyType::ZSet);

/// A stored value with its optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The actual value stored
    pub value: Value,
    /// When this entry expires, in unix milliseconds (None = never expires)
    pub expires_at: Option<i64>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub fn with_expiry(value: Value, expires_at: Option<i64>) -> Self {
        Self { value, expires_at }
    }

    #[inline]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Returns the current time in unix milliseconds.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Engine-wide counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageStats {
    /// Transactions committed
    pub commits: u64,
    /// Transactions rolled back
    pub rollbacks: u64,
    /// Expired keys removed by the sweeper
    pub expired: u64,
}

/// The storage engine.
///
/// Wrap it in an `Arc` and share it across all connection tasks.
///
/// # Example
///
/// ```
/// use relkv::storage::Db;
/// use bytes::Bytes;
///
/// let db = Db::new();
/// let key = Bytes::from("name");
///
/// db.update(|tx| tx.str().set(&key, Bytes::from("alice"))).unwrap();
/// let value = db.update(|tx| tx.str().get(&key)).unwrap();
/// assert_eq!(value, Some(Bytes::from("alice")));
/// ```
pub struct Db {
    keyspace: RwLock<Rows<Entry>>,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    expired: AtomicU64,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("keys", &self.len())
            .field("commits", &self.commits.load(Ordering::Relaxed))
            .field("rollbacks", &self.rollbacks.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

impl Db {
    pub fn new() -> Self {
        Self {
            keyspace: RwLock::new(Rows::new()),
            commits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Runs `f` inside a transaction.
    ///
    /// Changes made through the transaction are committed when `f` returns
    /// `Ok`, and rolled back entirely when it returns `Err`.
    pub fn update<T>(&self, f: impl FnOnce(&mut Tx<'_>) -> Result<T>) -> Result<T> {
        self.transact(f)
    }

    /// Like [`Db::update`], for closures with their own error type.
    pub fn transact<T, E>(
        &self,
        f: impl FnOnce(&mut Tx<'_>) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        let mut keyspace = self.keyspace.write().unwrap_or_else(PoisonError::into_inner);
        let mut tx = Tx::new(&mut keyspace);

        match f(&mut tx) {
            Ok(value) => {
                self.commits.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(err) => {
                tx.rollback();
                self.rollbacks.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    /// Returns the number of rows in the keyspace, expired ones included.
    pub fn len(&self) -> usize {
        self.keyspace
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every expired key. Called by the background sweeper.
    ///
    /// Returns the number of keys removed.
    pub fn delete_expired(&self) -> u64 {
        let now = unix_millis();
        let mut keyspace = self.keyspace.write().unwrap_or_else(PoisonError::into_inner);

        let before = keyspace.len();
        keyspace.retain(|_, entry| !entry.is_expired(now));
        let removed = (before - keyspace.len()) as u64;

        if removed > 0 {
            self.expired.fetch_add(removed, Ordering::Relaxed);
        }
        removed
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

/// The prior state of a key, recorded on first touch.
#[derive(Debug)]
struct Undo {
    key: Bytes,
    prior: Option<(u64, Entry)>,
}

/// An open transaction against the keyspace.
///
/// Per-type operations are reached through the sub-accessors
/// ([`Tx::key`], [`Tx::str`], [`Tx::list`], [`Tx::hash`], [`Tx::set`],
/// [`Tx::zset`]).
pub struct Tx<'a> {
    rows: &'a mut Rows<Entry>,
    undo: Vec<Undo>,
    touched: HashSet<Bytes>,
    now: i64,
}

impl<'a> Tx<'a> {
    fn new(rows: &'a mut Rows<Entry>) -> Self {
        Self {
            rows,
            undo: Vec::new(),
            touched: HashSet::new(),
            now: unix_millis(),
        }
    }

    /// The transaction's clock, in unix milliseconds. Fixed at start.
    #[inline]
    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn key(&mut self) -> Keys<'_, 'a> {
        Keys { tx: self }
    }

    pub fn str(&mut self) -> Strings<'_, 'a> {
        Strings { tx: self }
    }

    pub fn list(&mut self) -> Lists<'_, 'a> {
        Lists { tx: self }
    }

    pub fn hash(&mut self) -> Hashes<'_, 'a> {
        Hashes { tx: self }
    }

    pub fn set(&mut self) -> Sets<'_, 'a> {
        Sets { tx: self }
    }

    pub fn zset(&mut self) -> SortedSets<'_, 'a> {
        SortedSets { tx: self }
    }

    // ========================================================================
    // Row access shared by the repositories
    // ========================================================================

    /// All rows, expired ones included.
    pub(crate) fn rows(&self) -> &Rows<Entry> {
        self.rows
    }

    /// Returns the entry for `key` unless it is missing or expired.
    pub(crate) fn live(&self, key: &[u8]) -> Option<&Entry> {
        self.rows.get(key).filter(|entry| !entry.is_expired(self.now))
    }

    /// Returns the typed value for `key`.
    pub(crate) fn get<T: Typed>(&self, key: &[u8]) -> Result<Option<&T>> {
        match self.live(key) {
            None => Ok(None),
            Some(entry) => T::of(&entry.value).map(Some).ok_or(Error::KeyType),
        }
    }

    /// Returns the typed value for `key`, for modification.
    pub(crate) fn get_mut<T: Typed>(&mut self, key: &[u8]) -> Result<Option<&mut T>> {
        self.evict_expired(key);
        match self.rows.get(key) {
            None => return Ok(None),
            Some(entry) if entry.value.kind() != T::KIND => return Err(Error::KeyType),
            Some(_) => {}
        }
        self.journal(key);
        Ok(self.rows.get_mut(key).and_then(|entry| T::of_mut(&mut entry.value)))
    }

    /// Returns the typed value for `key`, creating an empty one if needed.
    pub(crate) fn get_or_create<T: Typed>(&mut self, key: &Bytes) -> Result<&mut T> {
        self.evict_expired(key);
        if let Some(entry) = self.rows.get(key) {
            if entry.value.kind() != T::KIND {
                return Err(Error::KeyType);
            }
        }
        self.journal(key);
        let entry = self
            .rows
            .get_or_insert_with(key.clone(), || Entry::new(T::default().into_value()));
        T::of_mut(&mut entry.value).ok_or(Error::KeyType)
    }

    /// Returns the entry for `key`, for modification.
    pub(crate) fn entry_mut(&mut self, key: &[u8]) -> Option<&mut Entry> {
        self.evict_expired(key);
        if !self.rows.contains(key) {
            return None;
        }
        self.journal(key);
        self.rows.get_mut(key)
    }

    /// Stores `entry` under `key`, replacing whatever was there.
    pub(crate) fn put(&mut self, key: Bytes, entry: Entry) {
        self.evict_expired(&key);
        self.journal(&key);
        self.rows.insert(key, entry);
    }

    /// Removes `key`, returning the entry if it was live.
    pub(crate) fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        self.evict_expired(key);
        if !self.rows.contains(key) {
            return None;
        }
        self.journal(key);
        self.rows.remove(key)
    }

    /// Deletes `key` if it holds a collection with no elements left.
    pub(crate) fn remove_if_empty(&mut self, key: &[u8]) {
        let empty = self
            .rows
            .get(key)
            .is_some_and(|entry| entry.value.is_empty_collection());
        if empty {
            self.journal(key);
            self.rows.remove(key);
        }
    }

    fn evict_expired(&mut self, key: &[u8]) {
        let now = self.now;
        if self.rows.get(key).is_some_and(|entry| entry.is_expired(now)) {
            self.journal(key);
            self.rows.remove(key);
        }
    }

    /// Records the state of `key` before its first modification.
    fn journal(&mut self, key: &[u8]) {
        if self.touched.contains(key) {
            return;
        }
        let key = Bytes::copy_from_slice(key);
        let prior = self
            .rows
            .get_full(&key)
            .map(|(id, entry)| (id, entry.clone()));
        self.touched.insert(key.clone());
        self.undo.push(Undo { key, prior });
    }

    fn rollback(&mut self) {
        for undo in self.undo.drain(..).rev() {
            self.rows.remove(&undo.key);
            if let Some((id, entry)) = undo.prior {
                self.rows.restore(id, undo.key, entry);
            }
        }
        self.touched.clear();
    }
}
