//! Sorted set values and their range algebra.
//!
//! A sorted set maps members to float scores. Ordering is by score, with
//! ties broken by member bytes:
//!
//! ```text
//!   (1.0, "b") < (2.0, "a") < (2.0, "c") < (5.5, "a")
//! ```
//!
//! Range, union, intersection and range deletion are configured with
//! plain values ([`RangeCmd`], [`Combine`]) and executed by a terminal call
//! on [`SortedSets`]:
//!
//! ```ignore
//! let top = tx.zset().range(b"board", RangeCmd::by_rank(0, 2).desc())?;
//! let n = tx.zset().combine_store(&dest, Combine::union(keys).aggregate(Aggregate::Max))?;
//! ```

use crate::storage::engine::{Entry, KeyType, Tx, Value, ZSet};
use crate::storage::error::{Error, Result};
use crate::storage::glob::Glob;
use crate::storage::rows::{clamp_range, Rows, ScanResult};
use bytes::Bytes;
use std::cmp::Ordering;
use std::collections::HashMap;

/// A member with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct SetItem {
    pub member: Bytes,
    pub score: f64,
}

impl SetItem {
    pub fn new(member: impl Into<Bytes>, score: f64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }

    fn cmp_order(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.member.cmp(&other.member))
    }
}

/// How a range selects elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum By {
    /// Inclusive rank range; negative ranks count from the end
    Rank(i64, i64),
    /// Inclusive score range
    Score(f64, f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Configuration for a range query.
///
/// Ranks are resolved after ordering, so with [`SortOrder::Desc`] rank 0
/// is the highest-scored member. `offset` and `count` apply last.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeCmd {
    pub by: By,
    pub order: SortOrder,
    pub offset: usize,
    pub count: Option<usize>,
}

impl RangeCmd {
    pub fn by_rank(start: i64, stop: i64) -> Self {
        Self::new(By::Rank(start, stop))
    }

    pub fn by_score(min: f64, max: f64) -> Self {
        Self::new(By::Score(min, max))
    }

    fn new(by: By) -> Self {
        Self {
            by,
            order: SortOrder::Asc,
            offset: 0,
            count: None,
        }
    }

    pub fn desc(mut self) -> Self {
        self.order = SortOrder::Desc;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Applies the range to the members of `zset`.
    pub fn select(&self, zset: &ZSet) -> Vec<SetItem> {
        let mut items = sorted(zset);
        if self.order == SortOrder::Desc {
            items.reverse();
        }

        let selected = match self.by {
            By::Rank(start, stop) => match clamp_range(start, stop, items.len()) {
                Some((start, stop)) => items.drain(start..=stop).collect(),
                None => Vec::new(),
            },
            By::Score(min, max) => {
                if min.is_nan() || max.is_nan() {
                    Vec::new()
                } else {
                    items
                        .into_iter()
                        .filter(|item| item.score >= min && item.score <= max)
                        .collect()
                }
            }
        };

        selected
            .into_iter()
            .skip(self.offset)
            .take(self.count.unwrap_or(usize::MAX))
            .collect()
    }
}

/// How scores of a member found in several sets are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Aggregate {
    #[default]
    Sum,
    Min,
    Max,
}

impl Aggregate {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            // inf + -inf counts as 0
            Aggregate::Sum => {
                let sum = a + b;
                if sum.is_nan() {
                    0.0
                } else {
                    sum
                }
            }
            Aggregate::Min => a.min(b),
            Aggregate::Max => a.max(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Union,
    Inter,
}

/// Configuration for a union or intersection of sorted sets.
#[derive(Debug, Clone, PartialEq)]
pub struct Combine {
    mode: Mode,
    keys: Vec<Bytes>,
    aggregate: Aggregate,
}

impl Combine {
    pub fn union(keys: Vec<Bytes>) -> Self {
        Self {
            mode: Mode::Union,
            keys,
            aggregate: Aggregate::Sum,
        }
    }

    pub fn inter(keys: Vec<Bytes>) -> Self {
        Self {
            mode: Mode::Inter,
            keys,
            aggregate: Aggregate::Sum,
        }
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }
}

/// Sorted set operations inside a transaction.
pub struct SortedSets<'t, 'a> {
    pub(crate) tx: &'t mut Tx<'a>,
}

impl SortedSets<'_, '_> {
    /// Adds or updates a member. Returns true if it was new.
    pub fn add(&mut self, key: &Bytes, member: Bytes, score: f64) -> Result<bool> {
        Ok(self.add_many(key, &[(score, member)])? == 1)
    }

    /// Adds or updates `(score, member)` pairs. Returns how many were new.
    pub fn add_many(&mut self, key: &Bytes, items: &[(f64, Bytes)]) -> Result<usize> {
        if items.iter().any(|(score, _)| score.is_nan()) {
            return Err(Error::ValueType);
        }
        let zset = self.tx.get_or_create::<ZSet>(key)?;
        let added = items
            .iter()
            .filter(|(score, member)| zset.insert(member.clone(), *score).is_none())
            .count();
        self.tx.remove_if_empty(key);
        Ok(added)
    }

    pub fn delete(&mut self, key: &[u8], members: &[Bytes]) -> Result<usize> {
        let Some(zset) = self.tx.get_mut::<ZSet>(key)? else {
            return Ok(0);
        };
        let removed = members
            .iter()
            .filter(|member| zset.remove(member).is_some())
            .count();
        self.tx.remove_if_empty(key);
        Ok(removed)
    }

    pub fn len(&self, key: &[u8]) -> Result<usize> {
        Ok(self.tx.get::<ZSet>(key)?.map_or(0, |zset| zset.len()))
    }

    pub fn get_score(&self, key: &[u8], member: &[u8]) -> Result<Option<f64>> {
        Ok(self.tx.get::<ZSet>(key)?.and_then(|zset| zset.get(member)).copied())
    }

    /// Returns the 0-based rank of `member` and its score.
    pub fn get_rank(&self, key: &[u8], member: &[u8]) -> Result<Option<(usize, f64)>> {
        self.rank(key, member, SortOrder::Asc)
    }

    /// Returns the rank of `member` counting from the highest score.
    pub fn get_rank_rev(&self, key: &[u8], member: &[u8]) -> Result<Option<(usize, f64)>> {
        self.rank(key, member, SortOrder::Desc)
    }

    fn rank(&self, key: &[u8], member: &[u8], order: SortOrder) -> Result<Option<(usize, f64)>> {
        let Some(zset) = self.tx.get::<ZSet>(key)? else {
            return Ok(None);
        };
        let Some(&score) = zset.get(member) else {
            return Ok(None);
        };
        let item = SetItem::new(Bytes::copy_from_slice(member), score);
        let below = zset
            .iter()
            .filter(|(m, s)| SetItem::new((*m).clone(), **s).cmp_order(&item) == Ordering::Less)
            .count();
        let rank = match order {
            SortOrder::Asc => below,
            SortOrder::Desc => zset.len() - 1 - below,
        };
        Ok(Some((rank, score)))
    }

    /// Adds `delta` to a member's score, creating it at `delta`.
    pub fn incr(&mut self, key: &Bytes, member: Bytes, delta: f64) -> Result<f64> {
        let zset = self.tx.get_or_create::<ZSet>(key)?;
        let score = zset.get(&member).copied().unwrap_or(0.0) + delta;
        if score.is_nan() {
            return Err(Error::ValueType);
        }
        zset.insert(member, score);
        Ok(score)
    }

    /// Counts members with `min <= score <= max`.
    pub fn count(&self, key: &[u8], min: f64, max: f64) -> Result<usize> {
        Ok(self.tx.get::<ZSet>(key)?.map_or(0, |zset| {
            zset.iter()
                .filter(|&(_, &score)| score >= min && score <= max)
                .count()
        }))
    }

    /// Runs a range query. A missing key yields an empty result.
    pub fn range(&self, key: &[u8], cmd: RangeCmd) -> Result<Vec<SetItem>> {
        Ok(self
            .tx
            .get::<ZSet>(key)?
            .map_or_else(Vec::new, |zset| cmd.select(zset)))
    }

    /// Deletes the members a range query would return. Returns the count.
    pub fn delete_range(&mut self, key: &[u8], by: By) -> Result<usize> {
        let selected = self.range(key, RangeCmd::new(by))?;
        let members: Vec<Bytes> = selected.into_iter().map(|item| item.member).collect();
        self.delete(key, &members)
    }

    /// Computes a union or intersection, ordered by score.
    ///
    /// Missing keys and keys of other types count as empty sets.
    pub fn combine(&self, cmd: &Combine) -> Vec<SetItem> {
        let mut order: Vec<Bytes> = Vec::new();
        let mut scores: HashMap<Bytes, (f64, usize)> = HashMap::new();

        for key in &cmd.keys {
            let Some(zset) = self.tx.get::<ZSet>(key).ok().flatten() else {
                continue;
            };
            for (member, &score) in zset.iter() {
                match scores.get_mut(member) {
                    Some((acc, seen)) => {
                        *acc = cmd.aggregate.apply(*acc, score);
                        *seen += 1;
                    }
                    None => {
                        order.push(member.clone());
                        scores.insert(member.clone(), (score, 1));
                    }
                }
            }
        }

        let mut items: Vec<SetItem> = order
            .into_iter()
            .filter_map(|member| {
                let (score, seen) = scores.get(&member).copied()?;
                let keep = cmd.mode == Mode::Union || seen == cmd.keys.len();
                keep.then(|| SetItem::new(member, score))
            })
            .collect();
        items.sort_by(SetItem::cmp_order);
        items
    }

    /// Computes a union or intersection and stores it at `dest`, replacing
    /// its previous contents. Returns the size of the result.
    ///
    /// Fails with `KeyType` if `dest` holds another type.
    pub fn combine_store(&mut self, dest: &Bytes, cmd: Combine) -> Result<usize> {
        if self
            .tx
            .live(dest)
            .is_some_and(|entry| entry.value.kind() != KeyType::ZSet)
        {
            return Err(Error::KeyType);
        }

        let items = self.combine(&cmd);
        self.tx.remove(dest);

        let len = items.len();
        if len > 0 {
            let mut zset = Rows::new();
            for item in items {
                zset.insert(item.member, item.score);
            }
            self.tx.put(dest.clone(), Entry::new(Value::ZSet(zset)));
        }
        Ok(len)
    }

    /// Fetches one page of members after `cursor`, in insertion order.
    pub fn scan(
        &self,
        key: &[u8],
        cursor: u64,
        pattern: &Glob,
        count: usize,
    ) -> Result<ScanResult<SetItem>> {
        let Some(zset) = self.tx.get::<ZSet>(key)? else {
            return Ok(ScanResult::empty());
        };
        let (page, cursor) = zset.page(cursor, count);
        let items = page
            .into_iter()
            .filter(|(member, _)| pattern.matches(member))
            .map(|(member, &score)| SetItem::new(member.clone(), score))
            .collect();
        Ok(ScanResult { cursor, items })
    }
}

/// Returns all members in ascending (score, member) order.
fn sorted(zset: &ZSet) -> Vec<SetItem> {
    let mut items: Vec<SetItem> = zset
        .iter()
        .map(|(member, &score)| SetItem::new(member.clone(), score))
        .collect();
    items.sort_by(SetItem::cmp_order);
    items
}
