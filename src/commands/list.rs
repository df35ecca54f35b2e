//! List commands.

use crate::args::{bytes, enum_of, int, opt_int, strings, Parser};
use crate::commands::{base, Base, Command, Error, ParseFn};
use crate::protocol::RespValue;
use crate::storage::{self, Position, Tx};
use bytes::Bytes;
use std::collections::HashMap;

pub(super) fn register(r: &mut HashMap<&'static str, ParseFn>) {
    r.insert("lpush", Push::parse);
    r.insert("rpush", Push::parse);
    r.insert("lpushx", Push::parse);
    r.insert("rpushx", Push::parse);
    r.insert("lpop", Pop::parse);
    r.insert("rpop", Pop::parse);
    r.insert("llen", LLen::parse);
    r.insert("lindex", LIndex::parse);
    r.insert("lrange", LRange::parse);
    r.insert("lset", LSet::parse);
    r.insert("lrem", LRem::parse);
    r.insert("ltrim", LTrim::parse);
    r.insert("linsert", LInsert::parse);
    r.insert("rpoplpush", RPopLPush::parse);
}

/// LPUSH, RPUSH, LPUSHX, RPUSHX key element [element ...]
#[derive(Debug)]
pub struct Push {
    base: Base,
    key: Bytes,
    elems: Vec<Bytes>,
}

impl Push {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut elems = Vec::new();
        Parser::new()
            .arg(bytes(&mut key))
            .arg(strings(&mut elems))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(Push { base, key, elems }))
    }
}

impl Command for Push {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let mut list = tx.list();
        let len = match self.name() {
            "lpush" => list.push_front(&self.key, &self.elems)?,
            "lpushx" => list.push_front_exists(&self.key, &self.elems)?,
            "rpushx" => list.push_back_exists(&self.key, &self.elems)?,
            _ => list.push_back(&self.key, &self.elems)?,
        };
        Ok(len.into())
    }
}

/// LPOP key [count], RPOP key [count]
///
/// Without a count the reply is a single element (or nil); with one it is
/// an array (or nil when the key is missing).
#[derive(Debug)]
pub struct Pop {
    base: Base,
    key: Bytes,
    count: Option<usize>,
}

impl Pop {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut count = None;
        Parser::new()
            .arg(bytes(&mut key))
            .arg(opt_int(&mut count))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(Pop { base, key, count }))
    }

    fn pop(&self, tx: &mut Tx<'_>) -> storage::Result<Option<Bytes>> {
        if self.name() == "lpop" {
            tx.list().pop_front(&self.key)
        } else {
            tx.list().pop_back(&self.key)
        }
    }
}

impl Command for Pop {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let Some(count) = self.count else {
            return Ok(self.pop(tx)?.into());
        };
        if !tx.key().exists(&self.key) {
            return Ok(RespValue::Null);
        }
        let mut popped = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            match self.pop(tx)? {
                Some(elem) => popped.push(elem),
                None => break,
            }
        }
        Ok(popped.into())
    }
}

/// LLEN key
#[derive(Debug)]
pub struct LLen {
    base: Base,
    key: Bytes,
}

impl LLen {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        Parser::new()
            .arg(bytes(&mut key))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(LLen { base, key }))
    }
}

impl Command for LLen {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.list().len(&self.key)?.into())
    }
}

/// LINDEX key index
#[derive(Debug)]
pub struct LIndex {
    base: Base,
    key: Bytes,
    index: i64,
}

impl LIndex {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut index = 0;
        Parser::new()
            .arg(bytes(&mut key))
            .arg(int(&mut index))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(LIndex { base, key, index }))
    }
}

impl Command for LIndex {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.list().get(&self.key, self.index)?.into())
    }
}

/// LRANGE key start stop
#[derive(Debug)]
pub struct LRange {
    base: Base,
    key: Bytes,
    start: i64,
    stop: i64,
}

impl LRange {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let (mut start, mut stop) = (0, 0);
        Parser::new()
            .arg(bytes(&mut key))
            .arg(int(&mut start))
            .arg(int(&mut stop))
            .required(3)
            .run(base.args())?;
        Ok(Box::new(LRange {
            base,
            key,
            start,
            stop,
        }))
    }
}

impl Command for LRange {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.list().range(&self.key, self.start, self.stop)?.into())
    }
}

/// LSET key index element
#[derive(Debug)]
pub struct LSet {
    base: Base,
    key: Bytes,
    index: i64,
    elem: Bytes,
}

impl LSet {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut index = 0;
        let mut elem = Bytes::new();
        Parser::new()
            .arg(bytes(&mut key))
            .arg(int(&mut index))
            .arg(bytes(&mut elem))
            .required(3)
            .run(base.args())?;
        Ok(Box::new(LSet {
            base,
            key,
            index,
            elem,
        }))
    }
}

impl Command for LSet {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let result = tx.list().set(&self.key, self.index, self.elem.clone());
        match result {
            Ok(()) => Ok(RespValue::ok()),
            Err(storage::Error::NotFound) if tx.key().exists(&self.key) => Err(Error::OutOfRange),
            Err(err) => Err(err.into()),
        }
    }
}

/// LREM key count element
#[derive(Debug)]
pub struct LRem {
    base: Base,
    key: Bytes,
    count: i64,
    elem: Bytes,
}

impl LRem {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut count = 0;
        let mut elem = Bytes::new();
        Parser::new()
            .arg(bytes(&mut key))
            .arg(int(&mut count))
            .arg(bytes(&mut elem))
            .required(3)
            .run(base.args())?;
        Ok(Box::new(LRem {
            base,
            key,
            count,
            elem,
        }))
    }
}

impl Command for LRem {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.list().delete(&self.key, &self.elem, self.count)?.into())
    }
}

/// LTRIM key start stop
#[derive(Debug)]
pub struct LTrim {
    base: Base,
    key: Bytes,
    start: i64,
    stop: i64,
}

impl LTrim {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let (mut start, mut stop) = (0, 0);
        Parser::new()
            .arg(bytes(&mut key))
            .arg(int(&mut start))
            .arg(int(&mut stop))
            .required(3)
            .run(base.args())?;
        Ok(Box::new(LTrim {
            base,
            key,
            start,
            stop,
        }))
    }
}

impl Command for LTrim {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        tx.list().trim(&self.key, self.start, self.stop)?;
        Ok(RespValue::ok())
    }
}

/// LINSERT key BEFORE|AFTER pivot element
///
/// Replies with the new length, -1 if the pivot is missing and 0 if the
/// key is missing.
#[derive(Debug)]
pub struct LInsert {
    base: Base,
    key: Bytes,
    pos: Position,
    pivot: Bytes,
    elem: Bytes,
}

const POSITIONS: [(&str, Position); 2] = [("before", Position::Before), ("after", Position::After)];

impl LInsert {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut pos = Position::Before;
        let (mut pivot, mut elem) = (Bytes::new(), Bytes::new());
        Parser::new()
            .arg(bytes(&mut key))
            .arg(enum_of(&mut pos, &POSITIONS))
            .arg(bytes(&mut pivot))
            .arg(bytes(&mut elem))
            .required(4)
            .run(base.args())?;
        Ok(Box::new(LInsert {
            base,
            key,
            pos,
            pivot,
            elem,
        }))
    }
}

impl Command for LInsert {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let inserted = tx
            .list()
            .insert(&self.key, &self.pivot, self.elem.clone(), self.pos);
        match inserted {
            Ok(Some(len)) => Ok(len.into()),
            Ok(None) => Ok(RespValue::integer(-1)),
            Err(storage::Error::NotFound) => Ok(RespValue::integer(0)),
            Err(err) => Err(err.into()),
        }
    }
}

/// RPOPLPUSH source destination
#[derive(Debug)]
pub struct RPopLPush {
    base: Base,
    src: Bytes,
    dest: Bytes,
}

impl RPopLPush {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut src, mut dest) = (Bytes::new(), Bytes::new());
        Parser::new()
            .arg(bytes(&mut src))
            .arg(bytes(&mut dest))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(RPopLPush { base, src, dest }))
    }
}

impl Command for RPopLPush {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.list().pop_back_push_front(&self.src, &self.dest)?.into())
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::tests::{bulk, bulks, err, run};
    use crate::protocol::RespValue;
    use crate::storage::Db;

    fn int(n: i64) -> RespValue {
        RespValue::Integer(n)
    }

    #[test]
    fn test_push_pop() {
        let db = Db::new();
        assert_eq!(run(&db, "rpush l a b"), int(2));
        assert_eq!(run(&db, "lpush l x y"), int(4));
        assert_eq!(run(&db, "lrange l 0 -1"), bulks(&["y", "x", "a", "b"]));
        assert_eq!(run(&db, "lpop l"), bulk("y"));
        assert_eq!(run(&db, "rpop l"), bulk("b"));
        assert_eq!(run(&db, "llen l"), int(2));
        assert_eq!(run(&db, "rpop l 5"), bulks(&["a", "x"]));
        assert_eq!(run(&db, "exists l"), int(0));
        assert_eq!(run(&db, "lpop l"), RespValue::Null);
        assert_eq!(run(&db, "lpop l 2"), RespValue::Null);
    }

    #[test]
    fn test_pushx() {
        let db = Db::new();
        assert_eq!(run(&db, "lpushx l a"), int(0));
        assert_eq!(run(&db, "exists l"), int(0));
        run(&db, "rpush l a");
        assert_eq!(run(&db, "rpushx l b"), int(2));
        assert_eq!(run(&db, "lpushx l c"), int(3));
        assert_eq!(run(&db, "lrange l 0 -1"), bulks(&["c", "a", "b"]));
    }

    #[test]
    fn test_lindex_lset() {
        let db = Db::new();
        run(&db, "rpush l a b c");
        assert_eq!(run(&db, "lindex l -1"), bulk("c"));
        assert_eq!(run(&db, "lindex l 9"), RespValue::Null);
        assert_eq!(run(&db, "lset l 1 B"), RespValue::ok());
        assert_eq!(run(&db, "lindex l 1"), bulk("B"));
        assert_eq!(run(&db, "lset l 9 x"), err("ERR index out of range (lset)"));
        assert_eq!(run(&db, "lset nope 0 x"), err("ERR no such key (lset)"));
    }

    #[test]
    fn test_lrem_ltrim() {
        let db = Db::new();
        run(&db, "rpush l a b a c a");
        assert_eq!(run(&db, "lrem l -2 a"), int(2));
        assert_eq!(run(&db, "lrange l 0 -1"), bulks(&["a", "b", "c"]));
        assert_eq!(run(&db, "ltrim l 1 -1"), RespValue::ok());
        assert_eq!(run(&db, "lrange l 0 -1"), bulks(&["b", "c"]));
        assert_eq!(run(&db, "ltrim l 5 10"), RespValue::ok());
        assert_eq!(run(&db, "exists l"), int(0));
    }

    #[test]
    fn test_linsert() {
        let db = Db::new();
        assert_eq!(run(&db, "linsert l before a x"), int(0));
        run(&db, "rpush l a c");
        assert_eq!(run(&db, "linsert l after a b"), int(3));
        assert_eq!(run(&db, "linsert l BEFORE a z"), int(4));
        assert_eq!(run(&db, "linsert l before nope x"), int(-1));
        assert_eq!(run(&db, "lrange l 0 -1"), bulks(&["z", "a", "b", "c"]));
        assert_eq!(run(&db, "linsert l middle a x"), err("ERR syntax error (linsert)"));
    }

    #[test]
    fn test_rpoplpush() {
        let db = Db::new();
        run(&db, "rpush src a b");
        assert_eq!(run(&db, "rpoplpush src dst"), bulk("b"));
        assert_eq!(run(&db, "rpoplpush src src"), bulk("a"));
        assert_eq!(run(&db, "lrange dst 0 -1"), bulks(&["b"]));
        run(&db, "set str v");
        assert_eq!(run(&db, "rpoplpush src str"), err("ERR key type mismatch (rpoplpush)"));
        assert_eq!(run(&db, "lrange src 0 -1"), bulks(&["a"]));
    }

    #[test]
    fn test_wrong_type() {
        let db = Db::new();
        run(&db, "set s v");
        assert_eq!(run(&db, "lpush s a"), err("ERR key type mismatch (lpush)"));
        assert_eq!(run(&db, "llen s"), err("ERR key type mismatch (llen)"));
    }
}
