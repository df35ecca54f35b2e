//! Set commands.

use crate::args::{bytes, int, named, opt_int, strings, Parser};
use crate::commands::key::{parse_cursor, scan_reply};
use crate::commands::{base, Base, Command, Error, ParseFn};
use crate::protocol::RespValue;
use crate::storage::{Glob, Tx};
use bytes::Bytes;
use std::collections::HashMap;

pub(super) fn register(r: &mut HashMap<&'static str, ParseFn>) {
    r.insert("sadd", SAdd::parse);
    r.insert("srem", SAdd::parse);
    r.insert("sismember", SIsMember::parse);
    r.insert("smembers", SMembers::parse);
    r.insert("scard", SMembers::parse);
    r.insert("spop", SPop::parse);
    r.insert("srandmember", SPop::parse);
    r.insert("sunion", Algebra::parse);
    r.insert("sinter", Algebra::parse);
    r.insert("sdiff", Algebra::parse);
    r.insert("sunionstore", AlgebraStore::parse);
    r.insert("sinterstore", AlgebraStore::parse);
    r.insert("sdiffstore", AlgebraStore::parse);
    r.insert("smove", SMove::parse);
    r.insert("sscan", SScan::parse);
}

/// SADD key member [member ...], SREM key member [member ...]
#[derive(Debug)]
pub struct SAdd {
    base: Base,
    key: Bytes,
    members: Vec<Bytes>,
}

impl SAdd {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut members = Vec::new();
        Parser::new()
            .arg(bytes(&mut key))
            .arg(strings(&mut members))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(SAdd { base, key, members }))
    }
}

impl Command for SAdd {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let n = if self.name() == "srem" {
            tx.set().delete(&self.key, &self.members)?
        } else {
            tx.set().add(&self.key, &self.members)?
        };
        Ok(n.into())
    }
}

/// SISMEMBER key member
#[derive(Debug)]
pub struct SIsMember {
    base: Base,
    key: Bytes,
    member: Bytes,
}

impl SIsMember {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut member) = (Bytes::new(), Bytes::new());
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut member))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(SIsMember { base, key, member }))
    }
}

impl Command for SIsMember {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.set().exists(&self.key, &self.member)?.into())
    }
}

/// SMEMBERS key, SCARD key
#[derive(Debug)]
pub struct SMembers {
    base: Base,
    key: Bytes,
}

impl SMembers {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        Parser::new()
            .arg(bytes(&mut key))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(SMembers { base, key }))
    }
}

impl Command for SMembers {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        if self.name() == "scard" {
            return Ok(tx.set().len(&self.key)?.into());
        }
        Ok(tx.set().items(&self.key)?.into())
    }
}

/// Largest `|count|` accepted by SRANDMEMBER with a negative count. The
/// reply holds that many members, so it is built in memory up front.
const MAX_RANDOM_REPEATS: u64 = 1 << 20;

/// SPOP key [count], SRANDMEMBER key [count]
///
/// Without a count the reply is one member or nil.
#[derive(Debug)]
pub struct SPop {
    base: Base,
    key: Bytes,
    count: Option<i64>,
}

impl SPop {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut count: Option<i64> = None;
        Parser::new()
            .arg(bytes(&mut key))
            .arg(opt_int(&mut count))
            .required(1)
            .run(base.args())?;
        if let Some(n) = count.filter(|n| *n < 0) {
            if base.name() == "spop" || n.unsigned_abs() > MAX_RANDOM_REPEATS {
                return Err(Error::OutOfRange);
            }
        }
        Ok(Box::new(SPop { base, key, count }))
    }
}

impl Command for SPop {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let n = self.count.unwrap_or(1);
        let members = if self.name() == "spop" {
            tx.set().pop(&self.key, usize::try_from(n).unwrap_or(usize::MAX))?
        } else {
            tx.set().random(&self.key, n)?
        };
        if self.count.is_some() {
            return Ok(members.into());
        }
        Ok(members.into_iter().next().into())
    }
}

/// SUNION, SINTER, SDIFF key [key ...]
#[derive(Debug)]
pub struct Algebra {
    base: Base,
    keys: Vec<Bytes>,
}

impl Algebra {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut keys = Vec::new();
        Parser::new()
            .arg(strings(&mut keys))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(Algebra { base, keys }))
    }
}

impl Command for Algebra {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let sets = tx.set();
        let members = match self.name() {
            "sinter" => sets.inter(&self.keys),
            "sdiff" => sets.diff(&self.keys),
            _ => sets.union(&self.keys),
        };
        Ok(members.into())
    }
}

/// SUNIONSTORE, SINTERSTORE, SDIFFSTORE destination key [key ...]
#[derive(Debug)]
pub struct AlgebraStore {
    base: Base,
    dest: Bytes,
    keys: Vec<Bytes>,
}

impl AlgebraStore {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut dest = Bytes::new();
        let mut keys = Vec::new();
        Parser::new()
            .arg(bytes(&mut dest))
            .arg(strings(&mut keys))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(AlgebraStore { base, dest, keys }))
    }
}

impl Command for AlgebraStore {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let mut sets = tx.set();
        let n = match self.name() {
            "sinterstore" => sets.inter_store(&self.dest, &self.keys)?,
            "sdiffstore" => sets.diff_store(&self.dest, &self.keys)?,
            _ => sets.union_store(&self.dest, &self.keys)?,
        };
        Ok(n.into())
    }
}

/// SMOVE source destination member
#[derive(Debug)]
pub struct SMove {
    base: Base,
    src: Bytes,
    dest: Bytes,
    member: Bytes,
}

impl SMove {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut src, mut dest, mut member) = (Bytes::new(), Bytes::new(), Bytes::new());
        Parser::new()
            .arg(bytes(&mut src))
            .arg(bytes(&mut dest))
            .arg(bytes(&mut member))
            .required(3)
            .run(base.args())?;
        Ok(Box::new(SMove {
            base,
            src,
            dest,
            member,
        }))
    }
}

impl Command for SMove {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let moved = tx.set().move_member(&self.src, &self.dest, &self.member)?;
        Ok(moved.into())
    }
}

/// SSCAN key cursor [MATCH pattern] [COUNT count]
#[derive(Debug)]
pub struct SScan {
    base: Base,
    key: Bytes,
    cursor: u64,
    pattern: Glob,
    count: usize,
}

impl SScan {
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
        Ok(Box::new(SScan {
            cursor: parse_cursor(&cursor)?,
            pattern: Glob::new(pattern),
            base,
            key,
            count,
        }))
    }
}

impl Command for SScan {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let result = tx
            .set()
            .scan(&self.key, self.cursor, &self.pattern, self.count)?;
        Ok(scan_reply(result, |member| vec![RespValue::bulk_string(member)]))
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
    fn test_sadd_srem() {
        let db = Db::new();
        assert_eq!(run(&db, "sadd s a b a"), int(2));
        assert_eq!(run(&db, "sadd s b c"), int(1));
        assert_eq!(run(&db, "scard s"), int(3));
        assert_eq!(run(&db, "smembers s"), bulks(&["a", "b", "c"]));
        assert_eq!(run(&db, "sismember s b"), int(1));
        assert_eq!(run(&db, "srem s b x"), int(1));
        assert_eq!(run(&db, "sismember s b"), int(0));
        assert_eq!(run(&db, "srem s a c"), int(2));
        assert_eq!(run(&db, "exists s"), int(0));
    }

    #[test]
    fn test_spop_srandmember() {
        let db = Db::new();
        assert_eq!(run(&db, "spop s"), RespValue::Null);
        run(&db, "sadd s only");
        assert_eq!(run(&db, "srandmember s"), bulk("only"));
        assert_eq!(run(&db, "srandmember s -3"), bulks(&["only", "only", "only"]));
        assert_eq!(run(&db, "srandmember s 5"), bulks(&["only"]));
        assert_eq!(run(&db, "spop s"), bulk("only"));
        assert_eq!(run(&db, "exists s"), int(0));
        assert_eq!(run(&db, "spop s 2"), bulks(&[]));
        assert_eq!(run(&db, "spop s -1"), err("ERR index out of range (spop)"));
    }

    #[test]
    fn test_spop_srandmember_huge_counts() {
        let db = Db::new();
        run(&db, "sadd s a b c");

        let reply = run(&db, "srandmember s 9223372036854775807");
        assert_eq!(reply.as_array().map(|items| items.len()), Some(3));
        assert_eq!(
            run(&db, "srandmember s -9223372036854775808"),
            err("ERR index out of range (srandmember)")
        );

        let reply = run(&db, "spop s 9223372036854775807");
        let mut popped: Vec<&str> = reply
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|item| item.as_str())
            .collect();
        popped.sort();
        assert_eq!(popped, ["a", "b", "c"]);
        assert_eq!(run(&db, "exists s"), int(0));
    }

    #[test]
    fn test_algebra() {
        let db = Db::new();
        run(&db, "sadd a 1 2 3");
        run(&db, "sadd b 2 3 4");
        assert_eq!(run(&db, "sinter a b"), bulks(&["2", "3"]));
        assert_eq!(run(&db, "sunion a b"), bulks(&["1", "2", "3", "4"]));
        assert_eq!(run(&db, "sdiff a b"), bulks(&["1"]));
        assert_eq!(run(&db, "sinter a nope"), bulks(&[]));
    }

    #[test]
    fn test_algebra_store() {
        let db = Db::new();
        run(&db, "sadd a 1 2");
        run(&db, "sadd b 2 3");
        assert_eq!(run(&db, "sunionstore d a b"), int(3));
        assert_eq!(run(&db, "smembers d"), bulks(&["1", "2", "3"]));
        assert_eq!(run(&db, "sinterstore d a nope"), int(0));
        assert_eq!(run(&db, "exists d"), int(0));
        run(&db, "set str v");
        assert_eq!(run(&db, "sdiffstore str a b"), err("ERR key type mismatch (sdiffstore)"));
    }

    #[test]
    fn test_smove() {
        let db = Db::new();
        run(&db, "sadd src a b");
        assert_eq!(run(&db, "smove src dst a"), int(1));
        assert_eq!(run(&db, "smove src dst a"), int(0));
        assert_eq!(run(&db, "smembers dst"), bulks(&["a"]));
        assert_eq!(run(&db, "smembers src"), bulks(&["b"]));
    }

    #[test]
    fn test_sscan() {
        let db = Db::new();
        run(&db, "sadd s a1 a2 b1");
        assert_eq!(
            run(&db, "sscan s 0 match a*"),
            RespValue::array(vec![bulk("0"), bulks(&["a1", "a2"])])
        );
        assert_eq!(run(&db, "sscan s abc"), err("ERR invalid cursor (sscan)"));
    }
}
