//! Set values: unordered collections of unique members.
//!
//! Members remember their insertion order, which is what SMEMBERS and
//! SSCAN report. Multi-key operations treat missing keys and keys of other
//! types as empty sets.

use crate::storage::engine::{Entry, KeyType, Set, Tx, Value};
use crate::storage::error::{Error, Result};
use crate::storage::glob::Glob;
use crate::storage::rows::{Rows, ScanResult};
use bytes::Bytes;
use rand::seq::{IteratorRandom, SliceRandom};

/// Set operations inside a transaction.
pub struct Sets<'t, 'a> {
    pub(crate) tx: &'t mut Tx<'a>,
}

impl Sets<'_, '_> {
    /// Adds members, returning how many were new.
    pub fn add(&mut self, key: &Bytes, members: &[Bytes]) -> Result<usize> {
        let set = self.tx.get_or_create::<Set>(key)?;
        let added = members
            .iter()
            .filter(|member| set.insert((*member).clone(), ()).is_none())
            .count();
        self.tx.remove_if_empty(key);
        Ok(added)
    }

    /// Removes members, returning how many existed.
    pub fn delete(&mut self, key: &[u8], members: &[Bytes]) -> Result<usize> {
        let Some(set) = self.tx.get_mut::<Set>(key)? else {
            return Ok(0);
        };
        let removed = members
            .iter()
            .filter(|member| set.remove(member).is_some())
            .count();
        self.tx.remove_if_empty(key);
        Ok(removed)
    }

    pub fn exists(&self, key: &[u8], member: &[u8]) -> Result<bool> {
        Ok(self.tx.get::<Set>(key)?.is_some_and(|set| set.contains(member)))
    }

    pub fn len(&self, key: &[u8]) -> Result<usize> {
        Ok(self.tx.get::<Set>(key)?.map_or(0, |set| set.len()))
    }

    pub fn items(&self, key: &[u8]) -> Result<Vec<Bytes>> {
        Ok(self
            .tx
            .get::<Set>(key)?
            .map_or_else(Vec::new, |set| set.iter().map(|(m, _)| m.clone()).collect()))
    }

    /// Removes and returns up to `count` random members.
    pub fn pop(&mut self, key: &[u8], count: usize) -> Result<Vec<Bytes>> {
        let Some(set) = self.tx.get_mut::<Set>(key)? else {
            return Ok(Vec::new());
        };
        let count = count.min(set.len());
        let mut rng = rand::thread_rng();
        let picked: Vec<Bytes> = set
            .iter()
            .map(|(member, _)| member.clone())
            .choose_multiple(&mut rng, count);
        for member in &picked {
            set.remove(member);
        }
        self.tx.remove_if_empty(key);
        Ok(picked)
    }

    /// Returns random members without removing them.
    ///
    /// A positive `count` returns up to `count` distinct members. A negative
    /// `count` returns exactly `|count|` members, possibly repeated.
    pub fn random(&self, key: &[u8], count: i64) -> Result<Vec<Bytes>> {
        let Some(set) = self.tx.get::<Set>(key)? else {
            return Ok(Vec::new());
        };
        let mut rng = rand::thread_rng();
        let members = set.iter().map(|(member, _)| member.clone());

        if count >= 0 {
            let count = usize::try_from(count).unwrap_or(usize::MAX).min(set.len());
            return Ok(members.choose_multiple(&mut rng, count));
        }

        let members: Vec<Bytes> = members.collect();
        let picked = (0..count.unsigned_abs())
            .filter_map(|_| members.choose(&mut rng).cloned())
            .collect();
        Ok(picked)
    }

    /// Moves `member` from `src` to `dest`. Returns false if `src` does
    /// not contain it.
    pub fn move_member(&mut self, src: &[u8], dest: &Bytes, member: &Bytes) -> Result<bool> {
        self.tx.get::<Set>(dest)?;
        if !self.exists(src, member)? {
            return Ok(false);
        }
        self.delete(src, std::slice::from_ref(member))?;
        self.add(dest, std::slice::from_ref(member))?;
        Ok(true)
    }

    /// Members present in any of `keys`, in order of first appearance.
    pub fn union(&self, keys: &[Bytes]) -> Vec<Bytes> {
        let mut out: Rows<()> = Rows::new();
        for set in keys.iter().filter_map(|key| self.source(key)) {
            for (member, _) in set.iter() {
                out.insert(member.clone(), ());
            }
        }
        out.iter().map(|(member, _)| member.clone()).collect()
    }

    /// Members of the first set present in every other set.
    pub fn inter(&self, keys: &[Bytes]) -> Vec<Bytes> {
        let sets: Vec<Option<&Set>> = keys.iter().map(|key| self.source(key)).collect();
        let Some(Some(first)) = sets.first() else {
            return Vec::new();
        };
        first
            .iter()
            .filter(|(member, _)| {
                sets[1..]
                    .iter()
                    .all(|set| set.is_some_and(|set| set.contains(member)))
            })
            .map(|(member, _)| member.clone())
            .collect()
    }

    /// Members of the first set not present in any other set.
    pub fn diff(&self, keys: &[Bytes]) -> Vec<Bytes> {
        let Some((first, rest)) = keys.split_first() else {
            return Vec::new();
        };
        let Some(first) = self.source(first) else {
            return Vec::new();
        };
        let rest: Vec<&Set> = rest.iter().filter_map(|key| self.source(key)).collect();
        first
            .iter()
            .filter(|(member, _)| !rest.iter().any(|set| set.contains(member)))
            .map(|(member, _)| member.clone())
            .collect()
    }

    pub fn union_store(&mut self, dest: &Bytes, keys: &[Bytes]) -> Result<usize> {
        let members = self.union(keys);
        self.store(dest, members)
    }

    pub fn inter_store(&mut self, dest: &Bytes, keys: &[Bytes]) -> Result<usize> {
        let members = self.inter(keys);
        self.store(dest, members)
    }

    pub fn diff_store(&mut self, dest: &Bytes, keys: &[Bytes]) -> Result<usize> {
        let members = self.diff(keys);
        self.store(dest, members)
    }

    /// Fetches one page of members after `cursor`.
    pub fn scan(
        &self,
        key: &[u8],
        cursor: u64,
        pattern: &Glob,
        count: usize,
    ) -> Result<ScanResult<Bytes>> {
        let Some(set) = self.tx.get::<Set>(key)? else {
            return Ok(ScanResult::empty());
        };
        let (page, cursor) = set.page(cursor, count);
        let items = page
            .into_iter()
            .filter(|(member, _)| pattern.matches(member))
            .map(|(member, _)| member.clone())
            .collect();
        Ok(ScanResult { cursor, items })
    }

    fn source(&self, key: &[u8]) -> Option<&Set> {
        self.tx.get::<Set>(key).ok().flatten()
    }

    /// Replaces `dest` with a set of `members`. An empty result deletes it.
    fn store(&mut self, dest: &Bytes, members: Vec<Bytes>) -> Result<usize> {
        if self
            .tx
            .live(dest)
            .is_some_and(|entry| entry.value.kind() != KeyType::Set)
        {
            return Err(Error::KeyType);
        }

        self.tx.remove(dest);
        let len = members.len();
        if len > 0 {
            let mut set = Set::new();
            for member in members {
                set.insert(member, ());
            }
            self.tx.put(dest.clone(), Entry::new(Value::Set(set)));
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Db;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    fn bs(items: &[&str]) -> Vec<Bytes> {
        items.iter().map(|s| b(s)).collect()
    }

    fn seeded() -> Db {
        let db = Db::new();
        db.update(|tx| {
            tx.set().add(&b("a"), &bs(&["1", "2", "3"]))?;
            tx.set().add(&b("b"), &bs(&["2", "3", "4"]))?;
            tx.str().set(&b("s"), b("x"))?;
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn test_add_delete() {
        let db = Db::new();
        db.update(|tx| {
            assert_eq!(tx.set().add(&b("s"), &bs(&["a", "b", "a"]))?, 2);
            assert!(tx.set().exists(b"s", b"a")?);
            assert_eq!(tx.set().len(b"s")?, 2);
            assert_eq!(tx.set().delete(b"s", &bs(&["a", "b", "c"]))?, 2);
            assert!(!tx.key().exists(b"s"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_algebra() {
        let db = seeded();
        db.update(|tx| {
            assert_eq!(tx.set().union(&bs(&["a", "b"])), bs(&["1", "2", "3", "4"]));
            assert_eq!(tx.set().inter(&bs(&["a", "b"])), bs(&["2", "3"]));
            assert_eq!(tx.set().diff(&bs(&["a", "b"])), bs(&["1"]));
            assert_eq!(tx.set().inter(&bs(&["a", "nope"])), Vec::<Bytes>::new());
            assert_eq!(tx.set().union(&bs(&["a", "s"])), bs(&["1", "2", "3"]));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_store() {
        let db = seeded();
        db.update(|tx| {
            assert_eq!(tx.set().inter_store(&b("dst"), &bs(&["a", "b"]))?, 2);
            assert_eq!(tx.set().items(b"dst")?, bs(&["2", "3"]));
            assert_eq!(tx.set().inter_store(&b("dst"), &bs(&["a", "nope"]))?, 0);
            assert!(!tx.key().exists(b"dst"));
            assert_eq!(
                tx.set().union_store(&b("s"), &bs(&["a"])),
                Err(Error::KeyType)
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_pop_and_random() {
        let db = seeded();
        db.update(|tx| {
            assert_eq!(tx.set().random(b"a", 10)?.len(), 3);
            assert_eq!(tx.set().random(b"a", -5)?.len(), 5);
            assert_eq!(tx.set().random(b"nope", 1)?, Vec::<Bytes>::new());

            let popped = tx.set().pop(b"a", 2)?;
            assert_eq!(popped.len(), 2);
            assert_eq!(tx.set().len(b"a")?, 1);
            tx.set().pop(b"a", 5)?;
            assert!(!tx.key().exists(b"a"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_counts_beyond_set_size() {
        let db = seeded();
        db.update(|tx| {
            let mut all = tx.set().random(b"a", i64::MAX)?;
            all.sort();
            assert_eq!(all, bs(&["1", "2", "3"]));

            let repeated = tx.set().random(b"a", -1000)?;
            assert_eq!(repeated.len(), 1000);
            assert!(repeated.iter().all(|m| tx.set().exists(b"a", m).unwrap()));

            let mut popped = tx.set().pop(b"a", usize::MAX)?;
            popped.sort();
            assert_eq!(popped, bs(&["1", "2", "3"]));
            assert!(!tx.key().exists(b"a"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_move_member() {
        let db = seeded();
        db.update(|tx| {
            assert!(tx.set().move_member(b"a", &b("c"), &b("1"))?);
            assert!(!tx.set().move_member(b"a", &b("c"), &b("1"))?);
            assert_eq!(tx.set().items(b"c")?, bs(&["1"]));
            assert_eq!(
                tx.set().move_member(b"a", &b("s"), &b("2")),
                Err(Error::KeyType)
            );
            Ok(())
        })
        .unwrap();
    }
}
