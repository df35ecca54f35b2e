//! Hash commands.

use crate::args::{any_map, bytes, float, int, named, strings, Parser};
use crate::commands::key::{parse_cursor, scan_reply};
use crate::commands::string::{not_a_float, not_an_int};
use crate::commands::{base, Base, Command, Error, ParseFn};
use crate::protocol::RespValue;
use crate::storage::{Glob, Tx};
use bytes::Bytes;
use std::collections::HashMap;

pub(super) fn register(r: &mut HashMap<&'static str, ParseFn>) {
    r.insert("hset", HSet::parse);
    r.insert("hmset", HSet::parse);
    r.insert("hsetnx", HSetNx::parse);
    r.insert("hget", HGet::parse);
    r.insert("hmget", HMGet::parse);
    r.insert("hdel", HDel::parse);
    r.insert("hexists", HExists::parse);
    r.insert("hgetall", HGetAll::parse);
    r.insert("hkeys", HGetAll::parse);
    r.insert("hvals", HGetAll::parse);
    r.insert("hlen", HLen::parse);
    r.insert("hincrby", HIncrBy::parse);
    r.insert("hincrbyfloat", HIncrByFloat::parse);
    r.insert("hscan", HScan::parse);
}

/// HSET key field value [field value ...]
///
/// HMSET takes the same arguments and replies OK.
#[derive(Debug)]
pub struct HSet {
    base: Base,
    key: Bytes,
    items: Vec<(Bytes, Bytes)>,
}

impl HSet {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut items = Vec::new();
        Parser::new()
            .arg(bytes(&mut key))
            .arg(any_map(&mut items))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(HSet { base, key, items }))
    }
}

impl Command for HSet {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let created = tx.hash().set_many(&self.key, &self.items)?;
        if self.name() == "hmset" {
            return Ok(RespValue::ok());
        }
        Ok(created.into())
    }
}

/// HSETNX key field value
#[derive(Debug)]
pub struct HSetNx {
    base: Base,
    key: Bytes,
    field: Bytes,
    value: Bytes,
}

impl HSetNx {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut field, mut value) = (Bytes::new(), Bytes::new(), Bytes::new());
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut field))
            .arg(bytes(&mut value))
            .required(3)
            .run(base.args())?;
        Ok(Box::new(HSetNx {
            base,
            key,
            field,
            value,
        }))
    }
}

impl Command for HSetNx {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let created = tx
            .hash()
            .set_not_exists(&self.key, self.field.clone(), self.value.clone())?;
        Ok(created.into())
    }
}

/// HGET key field
#[derive(Debug)]
pub struct HGet {
    base: Base,
    key: Bytes,
    field: Bytes,
}

impl HGet {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut field) = (Bytes::new(), Bytes::new());
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut field))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(HGet { base, key, field }))
    }
}

impl Command for HGet {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.hash().get(&self.key, &self.field)?.into())
    }
}

/// HMGET key field [field ...]
#[derive(Debug)]
pub struct HMGet {
    base: Base,
    key: Bytes,
    fields: Vec<Bytes>,
}

impl HMGet {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut fields = Vec::new();
        Parser::new()
            .arg(bytes(&mut key))
            .arg(strings(&mut fields))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(HMGet { base, key, fields }))
    }
}

impl Command for HMGet {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.hash().get_many(&self.key, &self.fields)?.into())
    }
}

/// HDEL key field [field ...]
#[derive(Debug)]
pub struct HDel {
    base: Base,
    key: Bytes,
    fields: Vec<Bytes>,
}

impl HDel {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut fields = Vec::new();
        Parser::new()
            .arg(bytes(&mut key))
            .arg(strings(&mut fields))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(HDel { base, key, fields }))
    }
}

impl Command for HDel {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.hash().delete(&self.key, &self.fields)?.into())
    }
}

/// HEXISTS key field
#[derive(Debug)]
pub struct HExists {
    base: Base,
    key: Bytes,
    field: Bytes,
}

impl HExists {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut field) = (Bytes::new(), Bytes::new());
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut field))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(HExists { base, key, field }))
    }
}

impl Command for HExists {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.hash().exists(&self.key, &self.field)?.into())
    }
}

/// HGETALL key, HKEYS key, HVALS key
#[derive(Debug)]
pub struct HGetAll {
    base: Base,
    key: Bytes,
}

impl HGetAll {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        Parser::new()
            .arg(bytes(&mut key))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(HGetAll { base, key }))
    }
}

impl Command for HGetAll {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let hash = tx.hash();
        Ok(match self.name() {
            "hkeys" => hash.fields(&self.key)?.into(),
            "hvals" => hash.values(&self.key)?.into(),
            _ => RespValue::bulk_array(
                hash.items(&self.key)?
                    .into_iter()
                    .flat_map(|(field, value)| [field, value]),
            ),
        })
    }
}

/// HLEN key
#[derive(Debug)]
pub struct HLen {
    base: Base,
    key: Bytes,
}

impl HLen {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        Parser::new()
            .arg(bytes(&mut key))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(HLen { base, key }))
    }
}

impl Command for HLen {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.hash().len(&self.key)?.into())
    }
}

/// HINCRBY key field delta
#[derive(Debug)]
pub struct HIncrBy {
    base: Base,
    key: Bytes,
    field: Bytes,
    delta: i64,
}

impl HIncrBy {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut field) = (Bytes::new(), Bytes::new());
        let mut delta = 0;
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut field))
            .arg(int(&mut delta))
            .required(3)
            .run(base.args())?;
        Ok(Box::new(HIncrBy {
            base,
            key,
            field,
            delta,
        }))
    }
}

impl Command for HIncrBy {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let n = tx
            .hash()
            .incr(&self.key, &self.field, self.delta)
            .map_err(not_an_int)?;
        Ok(n.into())
    }
}

/// HINCRBYFLOAT key field delta
#[derive(Debug)]
pub struct HIncrByFloat {
    base: Base,
    key: Bytes,
    field: Bytes,
    delta: f64,
}

impl HIncrByFloat {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut field) = (Bytes::new(), Bytes::new());
        let mut delta = 0.0;
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut field))
            .arg(float(&mut delta))
            .required(3)
            .run(base.args())?;
        Ok(Box::new(HIncrByFloat {
            base,
            key,
            field,
            delta,
        }))
    }
}

impl Command for HIncrByFloat {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let n = tx
            .hash()
            .incr_float(&self.key, &self.field, self.delta)
            .map_err(not_a_float)?;
        Ok(RespValue::float(n))
    }
}

/// HSCAN key cursor [MATCH pattern] [COUNT count]
///
/// Items come back flattened: field, value, field, value...
#[derive(Debug)]
pub struct HScan {
    base: Base,
    key: Bytes,
    cursor: u64,
    pattern: Glob,
    count: usize,
}

impl HScan {
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
        Ok(Box::new(HScan {
            cursor: parse_cursor(&cursor)?,
            pattern: Glob::new(pattern),
            base,
            key,
            count,
        }))
    }
}

impl Command for HScan {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let result = tx
            .hash()
            .scan(&self.key, self.cursor, &self.pattern, self.count)?;
        Ok(scan_reply(result, |(field, value)| {
            vec![RespValue::bulk_string(field), RespValue::bulk_string(value)]
        }))
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
    fn test_hset_hget() {
        let db = Db::new();
        assert_eq!(run(&db, "hset h f1 a f2 b"), int(2));
        assert_eq!(run(&db, "hset h f1 x f3 c"), int(1));
        assert_eq!(run(&db, "hget h f1"), bulk("x"));
        assert_eq!(run(&db, "hget h nope"), RespValue::Null);
        assert_eq!(run(&db, "hlen h"), int(3));
        assert_eq!(run(&db, "hmset h f4 d"), RespValue::ok());
        assert_eq!(
            run(&db, "hmget h f1 nope f2"),
            RespValue::array(vec![bulk("x"), RespValue::Null, bulk("b")])
        );
    }

    #[test]
    fn test_hsetnx_hexists_hdel() {
        let db = Db::new();
        assert_eq!(run(&db, "hsetnx h f a"), int(1));
        assert_eq!(run(&db, "hsetnx h f b"), int(0));
        assert_eq!(run(&db, "hget h f"), bulk("a"));
        assert_eq!(run(&db, "hexists h f"), int(1));
        assert_eq!(run(&db, "hdel h f nope"), int(1));
        assert_eq!(run(&db, "hexists h f"), int(0));
        assert_eq!(run(&db, "exists h"), int(0));
    }

    #[test]
    fn test_hgetall_keys_vals() {
        let db = Db::new();
        run(&db, "hset h a 1 b 2");
        assert_eq!(run(&db, "hgetall h"), bulks(&["a", "1", "b", "2"]));
        assert_eq!(run(&db, "hkeys h"), bulks(&["a", "b"]));
        assert_eq!(run(&db, "hvals h"), bulks(&["1", "2"]));
        assert_eq!(run(&db, "hgetall nope"), bulks(&[]));
    }

    #[test]
    fn test_hincr() {
        let db = Db::new();
        assert_eq!(run(&db, "hincrby h n 5"), int(5));
        assert_eq!(run(&db, "hincrby h n -7"), int(-2));
        assert_eq!(run(&db, "hincrbyfloat h f 1.25"), bulk("1.25"));
        run(&db, "hset h s abc");
        assert_eq!(run(&db, "hincrby h s 1"), err("ERR value is not an integer (hincrby)"));
    }

    #[test]
    fn test_hscan() {
        let db = Db::new();
        run(&db, "hset h a 1 b 2 c 3");
        assert_eq!(
            run(&db, "hscan h 0 match [ab]"),
            RespValue::array(vec![bulk("0"), bulks(&["a", "1", "b", "2"])])
        );
        assert_eq!(
            run(&db, "hscan h 0 count 2"),
            RespValue::array(vec![bulk("2"), bulks(&["a", "1", "b", "2"])])
        );
        assert_eq!(
            run(&db, "hscan h 2 count 2"),
            RespValue::array(vec![bulk("0"), bulks(&["c", "3"])])
        );
        assert_eq!(
            run(&db, "hscan nope 0"),
            RespValue::array(vec![bulk("0"), bulks(&[])])
        );
        assert_eq!(run(&db, "hscan h -1"), err("ERR invalid cursor (hscan)"));
    }

    #[test]
    fn test_wrong_type() {
        let db = Db::new();
        run(&db, "set s v");
        assert_eq!(run(&db, "hget s f"), err("ERR key type mismatch (hget)"));
    }
}
