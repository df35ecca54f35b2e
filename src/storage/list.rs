//! List values.
//!
//! Lists are double-ended queues. A list that loses its last element is
//! deleted together with its key.

use crate::storage::engine::{List, Tx};
use crate::storage::error::{Error, Result};
use crate::storage::rows::clamp_range;
use bytes::Bytes;

/// Where LINSERT places the new element relative to the pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Before,
    After,
}

/// List operations inside a transaction.
pub struct Lists<'t, 'a> {
    pub(crate) tx: &'t mut Tx<'a>,
}

impl Lists<'_, '_> {
    pub fn len(&self, key: &[u8]) -> Result<usize> {
        Ok(self.tx.get::<List>(key)?.map_or(0, |list| list.len()))
    }

    /// Pushes `elems` to the head one by one, so the last one ends up first.
    /// Returns the new length.
    pub fn push_front(&mut self, key: &Bytes, elems: &[Bytes]) -> Result<usize> {
        let list = self.tx.get_or_create::<List>(key)?;
        for elem in elems {
            list.push_front(elem.clone());
        }
        let len = list.len();
        self.tx.remove_if_empty(key);
        Ok(len)
    }

    /// Appends `elems` to the tail. Returns the new length.
    pub fn push_back(&mut self, key: &Bytes, elems: &[Bytes]) -> Result<usize> {
        let list = self.tx.get_or_create::<List>(key)?;
        list.extend(elems.iter().cloned());
        let len = list.len();
        self.tx.remove_if_empty(key);
        Ok(len)
    }

    /// Pushes only if the list already exists. Returns the new length
    /// (0 when the key is missing).
    pub fn push_front_exists(&mut self, key: &Bytes, elems: &[Bytes]) -> Result<usize> {
        if self.tx.get::<List>(key)?.is_none() {
            return Ok(0);
        }
        self.push_front(key, elems)
    }

    pub fn push_back_exists(&mut self, key: &Bytes, elems: &[Bytes]) -> Result<usize> {
        if self.tx.get::<List>(key)?.is_none() {
            return Ok(0);
        }
        self.push_back(key, elems)
    }

    pub fn pop_front(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        let elem = match self.tx.get_mut::<List>(key)? {
            Some(list) => list.pop_front(),
            None => return Ok(None),
        };
        self.tx.remove_if_empty(key);
        Ok(elem)
    }

    pub fn pop_back(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        let elem = match self.tx.get_mut::<List>(key)? {
            Some(list) => list.pop_back(),
            None => return Ok(None),
        };
        self.tx.remove_if_empty(key);
        Ok(elem)
    }

    /// Returns the element at `index` (negative counts from the tail).
    pub fn get(&self, key: &[u8], index: i64) -> Result<Option<Bytes>> {
        let Some(list) = self.tx.get::<List>(key)? else {
            return Ok(None);
        };
        Ok(resolve(index, list.len()).and_then(|i| list.get(i).cloned()))
    }

    /// Returns elements `start..=stop`.
    pub fn range(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Bytes>> {
        let Some(list) = self.tx.get::<List>(key)? else {
            return Ok(Vec::new());
        };
        Ok(match clamp_range(start, stop, list.len()) {
            Some((start, stop)) => list.range(start..=stop).cloned().collect(),
            None => Vec::new(),
        })
    }

    /// Replaces the element at `index`.
    ///
    /// Fails with `NotFound` if the key is missing or the index is out of range.
    pub fn set(&mut self, key: &[u8], index: i64, elem: Bytes) -> Result<()> {
        let list = self.tx.get_mut::<List>(key)?.ok_or(Error::NotFound)?;
        let i = resolve(index, list.len()).ok_or(Error::NotFound)?;
        list[i] = elem;
        Ok(())
    }

    /// Keeps only elements `start..=stop`. Returns how many were removed.
    pub fn trim(&mut self, key: &[u8], start: i64, stop: i64) -> Result<usize> {
        let Some(list) = self.tx.get_mut::<List>(key)? else {
            return Ok(0);
        };
        let before = list.len();
        match clamp_range(start, stop, before) {
            Some((start, stop)) => {
                list.truncate(stop + 1);
                list.drain(..start);
            }
            None => list.clear(),
        }
        let removed = before - list.len();
        self.tx.remove_if_empty(key);
        Ok(removed)
    }

    /// Removes occurrences of `elem`.
    ///
    /// `count > 0` removes up to `count` from the head, `count < 0` up to
    /// `|count|` from the tail, and `count == 0` removes all of them.
    pub fn delete(&mut self, key: &[u8], elem: &[u8], count: i64) -> Result<usize> {
        let Some(list) = self.tx.get_mut::<List>(key)? else {
            return Ok(0);
        };

        let limit = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs() as usize
        };
        let mut removed = 0;

        if count >= 0 {
            let mut i = 0;
            while i < list.len() && removed < limit {
                if list[i] == elem {
                    list.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        } else {
            let mut i = list.len();
            while i > 0 && removed < limit {
                i -= 1;
                if list[i] == elem {
                    list.remove(i);
                    removed += 1;
                }
            }
        }

        self.tx.remove_if_empty(key);
        Ok(removed)
    }

    /// Inserts `elem` next to the first occurrence of `pivot`.
    ///
    /// Returns the new length, `Ok(None)` if the pivot is not in the list,
    /// and `Err(NotFound)` if the key does not exist.
    pub fn insert(
        &mut self,
        key: &[u8],
        pivot: &[u8],
        elem: Bytes,
        pos: Position,
    ) -> Result<Option<usize>> {
        let list = self.tx.get_mut::<List>(key)?.ok_or(Error::NotFound)?;
        let Some(i) = list.iter().position(|e| e == pivot) else {
            return Ok(None);
        };
        match pos {
            Position::Before => list.insert(i, elem),
            Position::After => list.insert(i + 1, elem),
        }
        Ok(Some(list.len()))
    }

    /// Moves the tail of `src` to the head of `dest`, returning the element.
    pub fn pop_back_push_front(&mut self, src: &[u8], dest: &Bytes) -> Result<Option<Bytes>> {
        // Type-check the destination before touching the source.
        self.tx.get::<List>(dest)?;
        let Some(elem) = self.pop_back(src)? else {
            return Ok(None);
        };
        self.push_front(dest, std::slice::from_ref(&elem))?;
        Ok(Some(elem))
    }
}

/// Resolves a possibly negative index against a list of `len` elements.
fn resolve(index: i64, len: usize) -> Option<usize> {
    let i = if index < 0 { len as i64 + index } else { index };
    (0..len as i64).contains(&i).then_some(i as usize)
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

    #[test]
    fn test_push_and_range() {
        let db = Db::new();
        db.update(|tx| {
            assert_eq!(tx.list().push_back(&b("l"), &bs(&["b", "c"]))?, 2);
            assert_eq!(tx.list().push_front(&b("l"), &bs(&["a", "z"]))?, 4);
            assert_eq!(tx.list().range(b"l", 0, -1)?, bs(&["z", "a", "b", "c"]));
            assert_eq!(tx.list().range(b"l", -2, 10)?, bs(&["b", "c"]));
            assert_eq!(tx.list().range(b"l", 3, 1)?, Vec::<Bytes>::new());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_pop_deletes_empty_list() {
        let db = Db::new();
        db.update(|tx| {
            tx.list().push_back(&b("l"), &bs(&["a", "b"]))?;
            assert_eq!(tx.list().pop_front(b"l")?, Some(b("a")));
            assert_eq!(tx.list().pop_back(b"l")?, Some(b("b")));
            assert_eq!(tx.list().pop_back(b"l")?, None);
            assert!(!tx.key().exists(b"l"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_push_exists() {
        let db = Db::new();
        db.update(|tx| {
            assert_eq!(tx.list().push_back_exists(&b("l"), &bs(&["a"]))?, 0);
            assert!(!tx.key().exists(b"l"));
            tx.list().push_back(&b("l"), &bs(&["a"]))?;
            assert_eq!(tx.list().push_front_exists(&b("l"), &bs(&["b"]))?, 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_get_and_set() {
        let db = Db::new();
        db.update(|tx| {
            tx.list().push_back(&b("l"), &bs(&["a", "b", "c"]))?;
            assert_eq!(tx.list().get(b"l", -1)?, Some(b("c")));
            assert_eq!(tx.list().get(b"l", 3)?, None);

            tx.list().set(b"l", 1, b("B"))?;
            assert_eq!(tx.list().get(b"l", 1)?, Some(b("B")));
            assert_eq!(tx.list().set(b"l", 5, b("x")), Err(Error::NotFound));
            assert_eq!(tx.list().set(b"nope", 0, b("x")), Err(Error::NotFound));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_trim() {
        let db = Db::new();
        db.update(|tx| {
            tx.list().push_back(&b("l"), &bs(&["a", "b", "c", "d"]))?;
            assert_eq!(tx.list().trim(b"l", 1, -2)?, 2);
            assert_eq!(tx.list().range(b"l", 0, -1)?, bs(&["b", "c"]));
            assert_eq!(tx.list().trim(b"l", 5, 10)?, 2);
            assert!(!tx.key().exists(b"l"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_delete() {
        let db = Db::new();
        db.update(|tx| {
            tx.list().push_back(&b("l"), &bs(&["a", "x", "b", "x", "c", "x"]))?;
            assert_eq!(tx.list().delete(b"l", b"x", -1)?, 1);
            assert_eq!(tx.list().range(b"l", 0, -1)?, bs(&["a", "x", "b", "x", "c"]));
            assert_eq!(tx.list().delete(b"l", b"x", 1)?, 1);
            assert_eq!(tx.list().range(b"l", 0, -1)?, bs(&["a", "b", "x", "c"]));
            assert_eq!(tx.list().delete(b"l", b"x", 0)?, 1);
            assert_eq!(tx.list().range(b"l", 0, -1)?, bs(&["a", "b", "c"]));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_insert() {
        let db = Db::new();
        db.update(|tx| {
            tx.list().push_back(&b("l"), &bs(&["a", "c"]))?;
            assert_eq!(tx.list().insert(b"l", b"c", b("b"), Position::Before)?, Some(3));
            assert_eq!(tx.list().insert(b"l", b"c", b("d"), Position::After)?, Some(4));
            assert_eq!(tx.list().insert(b"l", b"zz", b("e"), Position::After)?, None);
            assert_eq!(tx.list().range(b"l", 0, -1)?, bs(&["a", "b", "c", "d"]));
            assert_eq!(
                tx.list().insert(b"nope", b"a", b("e"), Position::After),
                Err(Error::NotFound)
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_pop_back_push_front() {
        let db = Db::new();
        db.update(|tx| {
            tx.list().push_back(&b("src"), &bs(&["a", "b"]))?;
            assert_eq!(tx.list().pop_back_push_front(b"src", &b("dst"))?, Some(b("b")));
            assert_eq!(tx.list().pop_back_push_front(b"src", &b("src"))?, Some(b("a")));
            assert_eq!(tx.list().range(b"src", 0, -1)?, bs(&["a"]));
            assert_eq!(tx.list().range(b"dst", 0, -1)?, bs(&["b"]));
            Ok(())
        })
        .unwrap();
    }
}
