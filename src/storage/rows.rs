//! Row tables with stable ordering.
//!
//! A [`Rows`] table maps a byte-string name (a key, a hash field, a set
//! member) to a value, and remembers the order in which names were first
//! inserted by giving every row a monotonically increasing id. Updating an
//! existing row keeps its id; removing and re-inserting a name allocates a
//! fresh one.
//!
//! The row ids are what scan cursors point into:
//!
//! ```text
//!   order:  1 -> "a"   2 -> "b"   5 -> "c"   9 -> "d"
//!                       ▲
//!            cursor = 2 │ next page starts after row 2
//! ```

use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// Default page size for scans when the caller passes `COUNT 0`.
pub const DEFAULT_SCAN_COUNT: usize = 10;

/// One page of a scan.
///
/// A `cursor` of 0 means there are no more pages.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult<T> {
    pub cursor: u64,
    pub items: Vec<T>,
}

impl<T> ScanResult<T> {
    /// The result of scanning a key that does not exist.
    pub fn empty() -> Self {
        Self {
            cursor: 0,
            items: Vec::new(),
        }
    }
}

/// Resolves an inclusive `start..=stop` index range against a sequence of
/// `len` elements. Negative indices count from the end (-1 is the last).
///
/// Returns `None` when the range selects nothing.
pub fn clamp_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if len == 0 || start >= len || start > stop {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// An insertion-ordered table of rows.
#[derive(Debug, Clone)]
pub struct Rows<V> {
    next_id: u64,
    order: BTreeMap<u64, Bytes>,
    index: HashMap<Bytes, (u64, V)>,
}

impl<V> Default for Rows<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Rows<V> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            order: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn contains(&self, name: &[u8]) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &[u8]) -> Option<&V> {
        self.index.get(name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &[u8]) -> Option<&mut V> {
        self.index.get_mut(name).map(|(_, v)| v)
    }

    /// Returns the row id together with the value.
    pub fn get_full(&self, name: &[u8]) -> Option<(u64, &V)> {
        self.index.get(name).map(|(id, v)| (*id, v))
    }

    /// Inserts or updates a row. Returns the previous value, if any.
    pub fn insert(&mut self, name: Bytes, value: V) -> Option<V> {
        if let Some((_, slot)) = self.index.get_mut(&name) {
            return Some(std::mem::replace(slot, value));
        }
        self.next_id += 1;
        self.order.insert(self.next_id, name.clone());
        self.index.insert(name, (self.next_id, value));
        None
    }

    /// Returns the value for `name`, inserting the result of `make` first
    /// if the row does not exist.
    pub fn get_or_insert_with(&mut self, name: Bytes, make: impl FnOnce() -> V) -> &mut V {
        let next_id = &mut self.next_id;
        let order = &mut self.order;
        let (_, value) = self.index.entry(name).or_insert_with_key(|name| {
            *next_id += 1;
            order.insert(*next_id, name.clone());
            (*next_id, make())
        });
        value
    }

    pub fn remove(&mut self, name: &[u8]) -> Option<V> {
        self.remove_full(name).map(|(_, v)| v)
    }

    /// Removes a row, returning its id and value.
    pub fn remove_full(&mut self, name: &[u8]) -> Option<(u64, V)> {
        let (id, value) = self.index.remove(name)?;
        self.order.remove(&id);
        Some((id, value))
    }

    /// Puts a row back under its original id. Used by transaction rollback.
    pub fn restore(&mut self, id: u64, name: Bytes, value: V) {
        if let Some((old_id, _)) = self.index.remove(&name) {
            self.order.remove(&old_id);
        }
        self.order.insert(id, name.clone());
        self.index.insert(name, (id, value));
        self.next_id = self.next_id.max(id);
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.index.clear();
    }

    /// Keeps only the rows for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&Bytes, &V) -> bool) {
        let order = &mut self.order;
        self.index.retain(|name, (id, value)| {
            let keep = keep(name, &*value);
            if !keep {
                order.remove(&*id);
            }
            keep
        });
    }

    /// Iterates rows in row-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &V)> + '_ {
        self.order.values().filter_map(move |name| {
            self.index.get(name).map(|(_, value)| (name, value))
        })
    }

    /// Fetches one page of rows whose id is greater than `cursor`.
    ///
    /// The returned cursor is the id of the last row in the page, or 0 when
    /// no rows remain after it. `count == 0` selects the default page size.
    pub fn page(&self, cursor: u64, count: usize) -> (Vec<(&Bytes, &V)>, u64) {
        let count = if count == 0 { DEFAULT_SCAN_COUNT } else { count };
        let mut rows = self
            .order
            .range((Bound::Excluded(cursor), Bound::Unbounded))
            .take(count.saturating_add(1));

        let mut page = Vec::with_capacity(count.min(self.len()));
        let mut last = 0;
        for (id, name) in rows.by_ref().take(count) {
            if let Some((_, value)) = self.index.get(name) {
                page.push((name, value));
            }
            last = *id;
        }

        let next = if rows.next().is_some() { last } else { 0 };
        (page, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(names: &[&str]) -> Rows<i32> {
        let mut rows = Rows::new();
        for (i, name) in names.iter().enumerate() {
            rows.insert(Bytes::from(name.to_string()), i as i32);
        }
        rows
    }

    #[test]
    fn test_insert_keeps_order() {
        let rows = table(&["c", "a", "b"]);
        let names: Vec<_> = rows.iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_update_keeps_row_id() {
        let mut rows = table(&["a", "b"]);
        let (id, _) = rows.get_full(b"a").unwrap();
        assert_eq!(rows.insert(Bytes::from("a"), 10), Some(0));
        assert_eq!(rows.get_full(b"a"), Some((id, &10)));
    }

    #[test]
    fn test_reinsert_moves_to_end() {
        let mut rows = table(&["a", "b"]);
        rows.remove(b"a");
        rows.insert(Bytes::from("a"), 7);
        let names: Vec<_> = rows.iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_restore_original_id() {
        let mut rows = table(&["a", "b", "c"]);
        let (id, _) = rows.remove_full(b"b").unwrap();
        rows.restore(id, Bytes::from("b"), 1);
        let names: Vec<_> = rows.iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_page_walks_everything_once() {
        let names: Vec<String> = (0..25).map(|i| format!("k{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let rows = table(&refs);

        for count in [1, 3, 10, 25, 100] {
            let mut seen = Vec::new();
            let mut cursor = 0;
            loop {
                let (page, next) = rows.page(cursor, count);
                assert!(page.len() <= count);
                seen.extend(page.into_iter().map(|(n, _)| n.clone()));
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            assert_eq!(seen.len(), 25, "count = {}", count);
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), 25, "count = {}", count);
        }
    }

    #[test]
    fn test_page_huge_count() {
        let rows = table(&["a", "b", "c"]);
        let (page, next) = rows.page(0, usize::MAX);
        assert_eq!(page.len(), 3);
        assert_eq!(next, 0);

        let (page, next) = rows.page(1, 1_000_000_000);
        assert_eq!(page.len(), 2);
        assert_eq!(next, 0);
    }

    #[test]
    fn test_page_default_count() {
        let names: Vec<String> = (0..15).map(|i| format!("k{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let rows = table(&refs);

        let (page, next) = rows.page(0, 0);
        assert_eq!(page.len(), DEFAULT_SCAN_COUNT);
        assert_ne!(next, 0);
    }

    #[test]
    fn test_clamp_range() {
        assert_eq!(clamp_range(0, -1, 5), Some((0, 4)));
        assert_eq!(clamp_range(-2, -1, 5), Some((3, 4)));
        assert_eq!(clamp_range(-100, 2, 5), Some((0, 2)));
        assert_eq!(clamp_range(1, 100, 5), Some((1, 4)));
        assert_eq!(clamp_range(3, 1, 5), None);
        assert_eq!(clamp_range(5, 10, 5), None);
        assert_eq!(clamp_range(0, -100, 5), None);
        assert_eq!(clamp_range(0, -1, 0), None);
    }

    #[test]
    fn test_retain() {
        let mut rows = table(&["a", "b", "c", "d"]);
        rows.retain(|_, v| v % 2 == 0);
        let names: Vec<_> = rows.iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(rows.len(), 2);
    }
}
