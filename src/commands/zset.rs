//! Sorted set commands.
//!
//! The range family shares one command value: ZRANGE, ZRANGEBYSCORE,
//! ZREVRANGE and ZREVRANGEBYSCORE only differ in which options they accept
//! and in the order of the score bounds.

use crate::args::{
    bytes, count, enum_of, flag, float, float_map, int, named, opt_int, parse_float, parse_int,
    strings, strings_n, Parser,
};
use crate::commands::key::{parse_cursor, scan_reply};
use crate::commands::string::not_a_float;
use crate::commands::{base, Base, Command, Error, ParseFn};
use crate::protocol::RespValue;
use crate::storage::{Aggregate, By, Combine, Glob, RangeCmd, SetItem, Tx};
use bytes::Bytes;
use std::cell::Cell;
use std::collections::HashMap;

pub(super) fn register(r: &mut HashMap<&'static str, ParseFn>) {
    r.insert("zadd", ZAdd::parse);
    r.insert("zrem", ZRem::parse);
    r.insert("zscore", ZScore::parse);
    r.insert("zrank", ZRank::parse);
    r.insert("zrevrank", ZRank::parse);
    r.insert("zcard", ZCard::parse);
    r.insert("zcount", ZCount::parse);
    r.insert("zincrby", ZIncrBy::parse);
    r.insert("zrange", ZRange::parse);
    r.insert("zrangebyscore", ZRange::parse);
    r.insert("zrevrange", ZRange::parse);
    r.insert("zrevrangebyscore", ZRange::parse);
    r.insert("zremrangebyrank", ZRemRange::parse);
    r.insert("zremrangebyscore", ZRemRange::parse);
    r.insert("zunion", ZCombine::parse);
    r.insert("zinter", ZCombine::parse);
    r.insert("zunionstore", ZCombine::parse_store);
    r.insert("zinterstore", ZCombine::parse_store);
    r.insert("zscan", ZScan::parse);
}

const AGGREGATES: [(&str, Aggregate); 3] = [
    ("sum", Aggregate::Sum),
    ("min", Aggregate::Min),
    ("max", Aggregate::Max),
];

/// Flattens items into `member [score]` pairs.
fn items_reply(items: Vec<SetItem>, with_scores: bool) -> RespValue {
    let mut values = Vec::with_capacity(items.len() * if with_scores { 2 } else { 1 });
    for item in items {
        values.push(RespValue::bulk_string(item.member));
        if with_scores {
            values.push(RespValue::float(item.score));
        }
    }
    RespValue::array(values)
}

/// ZADD key score member [score member ...]
#[derive(Debug)]
pub struct ZAdd {
    base: Base,
    key: Bytes,
    items: Vec<(f64, Bytes)>,
}

impl ZAdd {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut items = Vec::new();
        Parser::new()
            .arg(bytes(&mut key))
            .arg(float_map(&mut items))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(ZAdd { base, key, items }))
    }
}

impl Command for ZAdd {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let added = tx
            .zset()
            .add_many(&self.key, &self.items)
            .map_err(not_a_float)?;
        Ok(added.into())
    }
}

/// ZREM key member [member ...]
#[derive(Debug)]
pub struct ZRem {
    base: Base,
    key: Bytes,
    members: Vec<Bytes>,
}

impl ZRem {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut members = Vec::new();
        Parser::new()
            .arg(bytes(&mut key))
            .arg(strings(&mut members))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(ZRem { base, key, members }))
    }
}

impl Command for ZRem {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.zset().delete(&self.key, &self.members)?.into())
    }
}

/// ZSCORE key member
#[derive(Debug)]
pub struct ZScore {
    base: Base,
    key: Bytes,
    member: Bytes,
}

impl ZScore {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut member) = (Bytes::new(), Bytes::new());
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut member))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(ZScore { base, key, member }))
    }
}

impl Command for ZScore {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let score = tx.zset().get_score(&self.key, &self.member)?;
        Ok(score.map_or(RespValue::Null, RespValue::float))
    }
}

/// ZRANK key member [WITHSCORE], ZREVRANK key member [WITHSCORE]
#[derive(Debug)]
pub struct ZRank {
    base: Base,
    key: Bytes,
    member: Bytes,
    with_score: bool,
}

impl ZRank {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut member) = (Bytes::new(), Bytes::new());
        let mut with_score = false;
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut member))
            .opt(flag("withscore", &mut with_score))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(ZRank {
            base,
            key,
            member,
            with_score,
        }))
    }
}

impl Command for ZRank {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let zset = tx.zset();
        let rank = if self.name() == "zrevrank" {
            zset.get_rank_rev(&self.key, &self.member)?
        } else {
            zset.get_rank(&self.key, &self.member)?
        };
        Ok(match rank {
            None => RespValue::Null,
            Some((rank, score)) if self.with_score => {
                RespValue::array(vec![rank.into(), RespValue::float(score)])
            }
            Some((rank, _)) => rank.into(),
        })
    }
}

/// ZCARD key
#[derive(Debug)]
pub struct ZCard {
    base: Base,
    key: Bytes,
}

impl ZCard {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        Parser::new()
            .arg(bytes(&mut key))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(ZCard { base, key }))
    }
}

impl Command for ZCard {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.zset().len(&self.key)?.into())
    }
}

/// ZCOUNT key min max
#[derive(Debug)]
pub struct ZCount {
    base: Base,
    key: Bytes,
    min: f64,
    max: f64,
}

impl ZCount {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let (mut min, mut max) = (0.0, 0.0);
        Parser::new()
            .arg(bytes(&mut key))
            .arg(float(&mut min))
            .arg(float(&mut max))
            .required(3)
            .run(base.args())?;
        Ok(Box::new(ZCount { base, key, min, max }))
    }
}

impl Command for ZCount {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.zset().count(&self.key, self.min, self.max)?.into())
    }
}

/// ZINCRBY key delta member
#[derive(Debug)]
pub struct ZIncrBy {
    base: Base,
    key: Bytes,
    delta: f64,
    member: Bytes,
}

impl ZIncrBy {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut member) = (Bytes::new(), Bytes::new());
        let mut delta = 0.0;
        Parser::new()
            .arg(bytes(&mut key))
            .arg(float(&mut delta))
            .arg(bytes(&mut member))
            .required(3)
            .run(base.args())?;
        Ok(Box::new(ZIncrBy {
            base,
            key,
            delta,
            member,
        }))
    }
}

impl Command for ZIncrBy {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let score = tx
            .zset()
            .incr(&self.key, self.member.clone(), self.delta)
            .map_err(not_a_float)?;
        Ok(RespValue::float(score))
    }
}

/// ZRANGE key start stop [BYSCORE] [REV] [LIMIT offset count] [WITHSCORES]
///
/// Also ZRANGEBYSCORE key min max [WITHSCORES] [LIMIT offset count],
/// ZREVRANGE key start stop [WITHSCORES] and
/// ZREVRANGEBYSCORE key max min [WITHSCORES] [LIMIT offset count].
///
/// In reverse score ranges the bounds come highest first. A negative LIMIT
/// count means no limit.
#[derive(Debug)]
pub struct ZRange {
    base: Base,
    key: Bytes,
    cmd: RangeCmd,
    with_scores: bool,
}

impl ZRange {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let name = base.name();
        let mut by_score = name.ends_with("byscore");
        let mut rev = name.starts_with("zrev");

        let mut key = Bytes::new();
        let (mut start, mut stop) = (Bytes::new(), Bytes::new());
        let mut with_scores = false;
        let (mut offset, mut limit) = (None::<usize>, -1i64);
        {
            let mut parser = Parser::new()
                .arg(bytes(&mut key))
                .arg(bytes(&mut start))
                .arg(bytes(&mut stop))
                .opt(flag("withscores", &mut with_scores))
                .required(3);
            if name == "zrange" {
                parser = parser
                    .opt(flag("byscore", &mut by_score))
                    .opt(flag("rev", &mut rev));
            }
            if name != "zrevrange" {
                parser = parser.opt(named("limit", opt_int(&mut offset)).and(int(&mut limit)));
            }
            parser.run(base.args())?;
        }

        let mut cmd = if by_score {
            let (mut min, mut max) = (parse_float(&start)?, parse_float(&stop)?);
            if rev {
                std::mem::swap(&mut min, &mut max);
            }
            RangeCmd::by_score(min, max)
        } else {
            if offset.is_some() {
                return Err(Error::SyntaxError);
            }
            RangeCmd::by_rank(parse_int(&start)?, parse_int(&stop)?)
        };
        if rev {
            cmd = cmd.desc();
        }
        if let Some(offset) = offset {
            cmd = cmd.offset(offset);
            if limit >= 0 {
                cmd = cmd.count(limit as usize);
            }
        }

        Ok(Box::new(ZRange {
            base,
            key,
            cmd,
            with_scores,
        }))
    }
}

impl Command for ZRange {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let items = tx.zset().range(&self.key, self.cmd)?;
        Ok(items_reply(items, self.with_scores))
    }
}

/// ZREMRANGEBYRANK key start stop, ZREMRANGEBYSCORE key min max
#[derive(Debug)]
pub struct ZRemRange {
    base: Base,
    key: Bytes,
    by: By,
}

impl ZRemRange {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let (mut start, mut stop) = (Bytes::new(), Bytes::new());
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut start))
            .arg(bytes(&mut stop))
            .required(3)
            .run(base.args())?;
        let by = if base.name() == "zremrangebyscore" {
            By::Score(parse_float(&start)?, parse_float(&stop)?)
        } else {
            By::Rank(parse_int(&start)?, parse_int(&stop)?)
        };
        Ok(Box::new(ZRemRange { base, key, by }))
    }
}

impl Command for ZRemRange {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.zset().delete_range(&self.key, self.by)?.into())
    }
}

/// ZUNION numkeys key [key ...] [AGGREGATE SUM|MIN|MAX] [WITHSCORES],
/// ZINTER likewise, and ZUNIONSTORE / ZINTERSTORE destination numkeys
/// key [key ...] [AGGREGATE SUM|MIN|MAX].
#[derive(Debug)]
pub struct ZCombine {
    base: Base,
    dest: Option<Bytes>,
    keys: Vec<Bytes>,
    aggregate: Aggregate,
    with_scores: bool,
}

impl ZCombine {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let n = Cell::new(0);
        let mut keys = Vec::new();
        let mut aggregate = Aggregate::Sum;
        let mut with_scores = false;
        Parser::new()
            .arg(count(&n))
            .arg(strings_n(&n, &mut keys))
            .opt(named("aggregate", enum_of(&mut aggregate, &AGGREGATES)))
            .opt(flag("withscores", &mut with_scores))
            .required(2)
            .run(base.args())?;
        if keys.is_empty() {
            return Err(Error::InvalidArgNum);
        }
        Ok(Box::new(ZCombine {
            base,
            dest: None,
            keys,
            aggregate,
            with_scores,
        }))
    }

    pub fn parse_store(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut dest = Bytes::new();
        let n = Cell::new(0);
        let mut keys = Vec::new();
        let mut aggregate = Aggregate::Sum;
        Parser::new()
            .arg(bytes(&mut dest))
            .arg(count(&n))
            .arg(strings_n(&n, &mut keys))
            .opt(named("aggregate", enum_of(&mut aggregate, &AGGREGATES)))
            .required(3)
            .run(base.args())?;
        if keys.is_empty() {
            return Err(Error::InvalidArgNum);
        }
        Ok(Box::new(ZCombine {
            base,
            dest: Some(dest),
            keys,
            aggregate,
            with_scores: false,
        }))
    }

    fn combine(&self) -> Combine {
        let keys = self.keys.clone();
        let combine = if self.name().starts_with("zinter") {
            Combine::inter(keys)
        } else {
            Combine::union(keys)
        };
        combine.aggregate(self.aggregate)
    }
}

impl Command for ZCombine {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let combine = self.combine();
        match &self.dest {
            Some(dest) => Ok(tx.zset().combine_store(dest, combine)?.into()),
            None => Ok(items_reply(tx.zset().combine(&combine), self.with_scores)),
        }
    }
}

/// ZSCAN key cursor [MATCH pattern] [COUNT count]
///
/// Items come back flattened: member, score, member, score...
#[derive(Debug)]
pub struct ZScan {
    base: Base,
    key: Bytes,
    cursor: u64,
    pattern: Glob,
    count: usize,
}

impl ZScan {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut cursor) = (Bytes::new(), Bytes::new());
        let mut pattern = Bytes::from_static(b"*");
        let mut count = 0;
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut cursor))
            .opt(named("match", bytes(&mut pattern)))
            .opt(named("count", int(&mut count)))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(ZScan {
            cursor: parse_cursor(&cursor)?,
            pattern: Glob::new(pattern),
            base,
            key,
            count,
        }))
    }
}

impl Command for ZScan {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let result = tx
            .zset()
            .scan(&self.key, self.cursor, &self.pattern, self.count)?;
        Ok(scan_reply(result, |item| {
            vec![RespValue::bulk_string(item.member), RespValue::float(item.score)]
        }))
    }
}
