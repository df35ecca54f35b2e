//! Keyspace-level operations: existence, expiry, renaming and scanning.

use crate::storage::engine::{Entry, KeyType, Tx};
use crate::storage::error::{Error, Result};
use crate::storage::glob::Glob;
use crate::storage::rows::ScanResult;
use bytes::Bytes;
use rand::seq::IteratorRandom;
use std::time::Duration;

/// Type and expiry of a live key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInfo {
    pub kind: KeyType,
    pub expires_at: Option<i64>,
}

/// Time-to-live of a key, as reported by TTL and PTTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Missing,
    Persistent,
    /// Milliseconds remaining
    Expires(i64),
}

/// Key operations inside a transaction.
pub struct Keys<'t, 'a> {
    pub(crate) tx: &'t mut Tx<'a>,
}

impl Keys<'_, '_> {
    pub fn exists(&self, key: &[u8]) -> bool {
        self.tx.live(key).is_some()
    }

    /// Counts how many of `keys` exist. A key named twice counts twice.
    pub fn count(&self, keys: &[Bytes]) -> usize {
        keys.iter().filter(|key| self.exists(key)).count()
    }

    pub fn get(&self, key: &[u8]) -> Option<KeyInfo> {
        self.tx.live(key).map(|entry| KeyInfo {
            kind: entry.value.kind(),
            expires_at: entry.expires_at,
        })
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.tx.now();
        self.tx
            .rows()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deletes `keys`, returning how many existed.
    pub fn delete(&mut self, keys: &[Bytes]) -> usize {
        keys.iter()
            .filter(|key| self.tx.remove(key).is_some())
            .count()
    }

    /// Deletes every key, returning how many were live.
    pub fn delete_all(&mut self) -> usize {
        let keys: Vec<Bytes> = self.tx.rows().iter().map(|(key, _)| key.clone()).collect();
        self.delete(&keys)
    }

    /// Sets a key to expire after `ttl`. Returns false if the key is missing.
    pub fn expire(&mut self, key: &[u8], ttl: Duration) -> bool {
        let at = self.tx.now().saturating_add(ttl.as_millis() as i64);
        self.expire_at(key, at)
    }

    /// Sets a key to expire at `at` (unix milliseconds).
    ///
    /// A time in the past deletes the key immediately.
    pub fn expire_at(&mut self, key: &[u8], at: i64) -> bool {
        if at <= self.tx.now() {
            return self.tx.remove(key).is_some();
        }
        match self.tx.entry_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Removes the expiry from a key. Returns true if one was removed.
    pub fn persist(&mut self, key: &[u8]) -> bool {
        if self.get(key).and_then(|info| info.expires_at).is_none() {
            return false;
        }
        match self.tx.entry_mut(key) {
            Some(entry) => entry.expires_at.take().is_some(),
            None => false,
        }
    }

    pub fn ttl(&self, key: &[u8]) -> Ttl {
        match self.get(key) {
            None => Ttl::Missing,
            Some(KeyInfo {
                expires_at: None, ..
            }) => Ttl::Persistent,
            Some(KeyInfo {
                expires_at: Some(at),
                ..
            }) => Ttl::Expires((at - self.tx.now()).max(0)),
        }
    }

    /// Returns every live key matching `pattern`, in row order.
    pub fn keys(&self, pattern: &Glob) -> Vec<Bytes> {
        let now = self.tx.now();
        self.tx
            .rows()
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Fetches one page of keys after `cursor`.
    ///
    /// Filtering by `pattern` and `kind` happens after the page is cut, so
    /// a page may hold fewer than `count` keys while the cursor is non-zero.
    pub fn scan(
        &self,
        cursor: u64,
        pattern: &Glob,
        kind: Option<KeyType>,
        count: usize,
    ) -> ScanResult<Bytes> {
        let now = self.tx.now();
        let (page, cursor) = self.tx.rows().page(cursor, count);
        let items = page
            .into_iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .filter(|(_, entry)| kind.map_or(true, |kind| entry.value.kind() == kind))
            .filter(|(key, _)| pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect();
        ScanResult { cursor, items }
    }

    /// Returns a random live key.
    pub fn random(&self) -> Option<Bytes> {
        let now = self.tx.now();
        self.tx
            .rows()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .choose(&mut rand::thread_rng())
    }

    /// Renames `key` to `new_key`, replacing any value at `new_key`.
    /// The expiry moves with the value.
    pub fn rename(&mut self, key: &[u8], new_key: &Bytes) -> Result<()> {
        if !self.exists(key) {
            return Err(Error::NotFound);
        }
        if key == new_key.as_ref() {
            return Ok(());
        }
        let entry: Entry = self.tx.remove(key).ok_or(Error::NotFound)?;
        self.tx.put(new_key.clone(), entry);
        Ok(())
    }

    /// Renames `key` only if `new_key` does not exist.
    pub fn rename_nx(&mut self, key: &[u8], new_key: &Bytes) -> Result<bool> {
        if !self.exists(key) {
            return Err(Error::NotFound);
        }
        if self.exists(new_key) {
            return Ok(false);
        }
        self.rename(key, new_key)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Db;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    fn seeded() -> Db {
        let db = Db::new();
        db.update(|tx| {
            tx.str().set(&b("name"), b("alice"))?;
            tx.str().set(&b("age"), b("25"))?;
            tx.list().push_back(&b("queue"), &[b("job")])?;
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn test_exists_and_count() {
        let db = seeded();
        db.update(|tx| {
            assert!(tx.key().exists(b"name"));
            assert!(!tx.key().exists(b"nope"));
            assert_eq!(tx.key().count(&[b("name"), b("name"), b("nope")]), 2);
            assert_eq!(tx.key().len(), 3);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_delete() {
        let db = seeded();
        let deleted = db
            .update(|tx| Ok(tx.key().delete(&[b("name"), b("nope"), b("queue")])))
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(db.update(|tx| Ok(tx.key().len())).unwrap(), 1);
    }

    #[test]
    fn test_expire_and_ttl() {
        let db = seeded();
        db.update(|tx| {
            assert_eq!(tx.key().ttl(b"name"), Ttl::Persistent);
            assert_eq!(tx.key().ttl(b"nope"), Ttl::Missing);

            assert!(tx.key().expire(b"name", Duration::from_secs(100)));
            match tx.key().ttl(b"name") {
                Ttl::Expires(ms) => assert!(ms > 99_000 && ms <= 100_000),
                other => panic!("unexpected ttl {:?}", other),
            }

            assert!(tx.key().persist(b"name"));
            assert!(!tx.key().persist(b"name"));
            assert_eq!(tx.key().ttl(b"name"), Ttl::Persistent);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_expire_in_past_deletes() {
        let db = seeded();
        db.update(|tx| {
            let past = tx.now() - 1;
            assert!(tx.key().expire_at(b"name", past));
            assert!(!tx.key().exists(b"name"));
            assert!(!tx.key().expire_at(b"nope", past));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_keys_pattern() {
        let db = seeded();
        let keys = db.update(|tx| Ok(tx.key().keys(&Glob::new("*a*")))).unwrap();
        assert_eq!(keys, vec![b("name"), b("age")]);
    }

    #[test]
    fn test_scan_type_filter() {
        let db = seeded();
        let page = db
            .update(|tx| Ok(tx.key().scan(0, &Glob::default(), Some(KeyType::List), 0)))
            .unwrap();
        assert_eq!(page.cursor, 0);
        assert_eq!(page.items, vec![b("queue")]);
    }

    #[test]
    fn test_rename() {
        let db = seeded();
        db.update(|tx| {
            tx.key().rename(b"name", &b("user"))?;
            assert!(!tx.key().exists(b"name"));
            assert_eq!(tx.str().get(b"user")?, Some(b("alice")));

            assert_eq!(tx.key().rename(b"nope", &b("x")), Err(Error::NotFound));
            assert_eq!(tx.key().rename_nx(b"user", &b("age")), Ok(false));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_random() {
        let db = Db::new();
        assert_eq!(db.update(|tx| Ok(tx.key().random())).unwrap(), None);

        let db = seeded();
        let key = db.update(|tx| Ok(tx.key().random())).unwrap().unwrap();
        assert!([b("name"), b("age"), b("queue")].contains(&key));
    }
}
