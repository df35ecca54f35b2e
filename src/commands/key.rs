//! Keyspace commands, plus the argument handling shared by the scan family.

use crate::args::{bytes, int, named, opt_bytes, strings, Parser};
use crate::commands::{base, Base, Command, Error, ParseFn};
use crate::protocol::RespValue;
use crate::storage::{Glob, KeyType, ScanResult, Ttl, Tx};
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

pub(super) fn register(r: &mut HashMap<&'static str, ParseFn>) {
    r.insert("del", Del::parse);
    r.insert("unlink", Del::parse);
    r.insert("exists", Exists::parse);
    r.insert("expire", Expire::parse);
    r.insert("pexpire", Expire::parse);
    r.insert("expireat", Expire::parse);
    r.insert("pexpireat", Expire::parse);
    r.insert("persist", Persist::parse);
    r.insert("ttl", TtlCmd::parse);
    r.insert("pttl", TtlCmd::parse);
    r.insert("type", Type::parse);
    r.insert("keys", Keys::parse);
    r.insert("scan", Scan::parse);
    r.insert("rename", Rename::parse);
    r.insert("renamenx", Rename::parse);
    r.insert("randomkey", RandomKey::parse);
}

// ============================================================================
// Scan arguments
// ============================================================================

/// Parses a client-supplied scan cursor.
pub(crate) fn parse_cursor(raw: &[u8]) -> Result<u64, Error> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::InvalidCursor)
}

/// `[cursor, [items...]]`
pub(crate) fn scan_reply<T>(result: ScanResult<T>, flatten: impl Fn(T) -> Vec<RespValue>) -> RespValue {
    let items = result.items.into_iter().flat_map(flatten).collect();
    RespValue::array(vec![
        RespValue::bulk_string(Bytes::from(result.cursor.to_string())),
        RespValue::array(items),
    ])
}

// ============================================================================
// Commands
// ============================================================================

/// DEL key [key ...]
#[derive(Debug)]
pub struct Del {
    base: Base,
    keys: Vec<Bytes>,
}

impl Del {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut keys = Vec::new();
        Parser::new()
            .arg(strings(&mut keys))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(Del { base, keys }))
    }
}

impl Command for Del {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.key().delete(&self.keys).into())
    }
}

/// EXISTS key [key ...]
#[derive(Debug)]
pub struct Exists {
    base: Base,
    keys: Vec<Bytes>,
}

impl Exists {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut keys = Vec::new();
        Parser::new()
            .arg(strings(&mut keys))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(Exists { base, keys }))
    }
}

impl Command for Exists {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.key().count(&self.keys).into())
    }
}

/// EXPIRE key seconds, PEXPIRE key ms, EXPIREAT key unix-seconds,
/// PEXPIREAT key unix-ms
///
/// A non-positive relative time, or an absolute time in the past, deletes
/// the key.
#[derive(Debug)]
pub struct Expire {
    base: Base,
    key: Bytes,
    /// Milliseconds, relative or absolute
    at: i64,
    absolute: bool,
}

impl Expire {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut n: i64 = 0;
        Parser::new()
            .arg(bytes(&mut key))
            .arg(int(&mut n))
            .required(2)
            .run(base.args())?;

        let (millis, absolute) = match base.name() {
            "expire" => (1000, false),
            "pexpire" => (1, false),
            "expireat" => (1000, true),
            _ => (1, true),
        };
        let at = n.checked_mul(millis).ok_or(Error::InvalidExpireTime)?;
        Ok(Box::new(Expire {
            base,
            key,
            at,
            absolute,
        }))
    }
}

impl Command for Expire {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let mut keys = tx.key();
        let done = match (self.absolute, self.at) {
            (false, ms) if ms > 0 => keys.expire(&self.key, Duration::from_millis(ms as u64)),
            (false, _) => keys.delete(std::slice::from_ref(&self.key)) > 0,
            (true, at) => keys.expire_at(&self.key, at),
        };
        Ok(done.into())
    }
}

/// PERSIST key
#[derive(Debug)]
pub struct Persist {
    base: Base,
    key: Bytes,
}

impl Persist {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        Parser::new()
            .arg(bytes(&mut key))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(Persist { base, key }))
    }
}

impl Command for Persist {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.key().persist(&self.key).into())
    }
}

/// TTL key, PTTL key
///
/// -2 for a missing key, -1 for a key without expiry.
#[derive(Debug)]
pub struct TtlCmd {
    base: Base,
    key: Bytes,
}

impl TtlCmd {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        Parser::new()
            .arg(bytes(&mut key))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(TtlCmd { base, key }))
    }
}

impl Command for TtlCmd {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let n = match tx.key().ttl(&self.key) {
            Ttl::Missing => -2,
            Ttl::Persistent => -1,
            Ttl::Expires(ms) if self.name() == "pttl" => ms,
            Ttl::Expires(ms) => (ms + 500) / 1000,
        };
        Ok(RespValue::integer(n))
    }
}

/// TYPE key
#[derive(Debug)]
pub struct Type {
    base: Base,
    key: Bytes,
}

impl Type {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        Parser::new()
            .arg(bytes(&mut key))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(Type { base, key }))
    }
}

impl Command for Type {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let kind = tx.key().get(&self.key).map_or("none", |info| info.kind.as_str());
        Ok(RespValue::simple_string(kind))
    }
}

/// KEYS pattern
#[derive(Debug)]
pub struct Keys {
    base: Base,
    pattern: Glob,
}

impl Keys {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut pattern = Bytes::new();
        Parser::new()
            .arg(bytes(&mut pattern))
            .required(1)
            .run(base.args())?;
        let pattern = Glob::new(pattern);
        Ok(Box::new(Keys { base, pattern }))
    }
}

impl Command for Keys {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.key().keys(&self.pattern).into())
    }
}

/// SCAN cursor [MATCH pattern] [COUNT count] [TYPE type]
///
/// `COUNT 0` (the default) uses the storage page size.
#[derive(Debug)]
pub struct Scan {
    base: Base,
    cursor: u64,
    pattern: Glob,
    kind: Option<KeyType>,
    count: usize,
}

impl Scan {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut cursor = Bytes::new();
        let mut pattern = Bytes::from_static(b"*");
        let mut kind = None;
        let mut count = 0usize;
        Parser::new()
            .arg(bytes(&mut cursor))
            .opt(named("match", bytes(&mut pattern)))
            .opt(named("count", int(&mut count)))
            .opt(named("type", opt_bytes(&mut kind)))
            .required(1)
            .run(base.args())?;

        let kind = match kind {
            Some(name) => Some(KeyType::parse(&name).ok_or(Error::SyntaxError)?),
            None => None,
        };
        Ok(Box::new(Scan {
            cursor: parse_cursor(&cursor)?,
            pattern: Glob::new(pattern),
            kind,
            count,
            base,
        }))
    }
}

impl Command for Scan {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let result = tx
            .key()
            .scan(self.cursor, &self.pattern, self.kind, self.count);
        Ok(scan_reply(result, |key| vec![RespValue::bulk_string(key)]))
    }
}

/// RENAME key newkey, RENAMENX key newkey
#[derive(Debug)]
pub struct Rename {
    base: Base,
    key: Bytes,
    new_key: Bytes,
}

impl Rename {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut new_key) = (Bytes::new(), Bytes::new());
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut new_key))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(Rename { base, key, new_key }))
    }
}

impl Command for Rename {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        if self.name() == "renamenx" {
            return Ok(tx.key().rename_nx(&self.key, &self.new_key)?.into());
        }
        tx.key().rename(&self.key, &self.new_key)?;
        Ok(RespValue::ok())
    }
}

/// RANDOMKEY
#[derive(Debug)]
pub struct RandomKey {
    base: Base,
}

impl RandomKey {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        Parser::new().run(base.args())?;
        Ok(Box::new(RandomKey { base }))
    }
}

impl Command for RandomKey {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.key().random().into())
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::tests::{bulk, bulks, err, run};
    use crate::commands::{parse, Error};
    use crate::protocol::RespValue;
    use crate::storage::Db;
    use bytes::Bytes;

    fn int(n: i64) -> RespValue {
        RespValue::Integer(n)
    }

    #[test]
    fn test_del_exists() {
        let db = Db::new();
        run(&db, "set a 1");
        run(&db, "set b 2");
        assert_eq!(run(&db, "exists a b c a"), int(3));
        assert_eq!(run(&db, "del a c"), int(1));
        assert_eq!(run(&db, "exists a"), int(0));
        assert_eq!(run(&db, "del"), err("ERR wrong number of arguments (del)"));
    }

    #[test]
    fn test_expire_ttl_persist() {
        let db = Db::new();
        assert_eq!(run(&db, "ttl k"), int(-2));
        run(&db, "set k v");
        assert_eq!(run(&db, "ttl k"), int(-1));
        assert_eq!(run(&db, "expire k 100"), int(1));
        assert_eq!(run(&db, "ttl k"), int(100));
        let pttl = run(&db, "pttl k").as_integer().unwrap();
        assert!(pttl > 99_000 && pttl <= 100_000);
        assert_eq!(run(&db, "persist k"), int(1));
        assert_eq!(run(&db, "persist k"), int(0));
        assert_eq!(run(&db, "ttl k"), int(-1));
        assert_eq!(run(&db, "expire nope 10"), int(0));
    }

    #[test]
    fn test_expire_in_past_deletes() {
        let db = Db::new();
        run(&db, "set a 1");
        run(&db, "set b 1");
        assert_eq!(run(&db, "expire a 0"), int(1));
        assert_eq!(run(&db, "pexpireat b 1000"), int(1));
        assert_eq!(run(&db, "dbsize"), int(0));
        assert_eq!(
            run(&db, "expire a 99999999999999999"),
            err("ERR invalid expire time (expire)")
        );
    }

    #[test]
    fn test_type() {
        let db = Db::new();
        run(&db, "set s v");
        run(&db, "zadd z 1 m");
        assert_eq!(run(&db, "type s"), RespValue::simple_string("string"));
        assert_eq!(run(&db, "type z"), RespValue::simple_string("zset"));
        assert_eq!(run(&db, "type nope"), RespValue::simple_string("none"));
    }

    #[test]
    fn test_keys() {
        let db = Db::new();
        run(&db, "set user:1 a");
        run(&db, "set user:2 b");
        run(&db, "set other c");
        assert_eq!(run(&db, "keys user:*"), bulks(&["user:1", "user:2"]));
    }

    #[test]
    fn test_scan_pages() {
        let db = Db::new();
        for i in 0..5 {
            run(&db, &format!("set k{} v", i));
        }
        let first = run(&db, "scan 0 count 3");
        let parts = first.as_array().unwrap();
        assert_eq!(parts[1], bulks(&["k0", "k1", "k2"]));
        let cursor = parts[0].as_str().unwrap().to_string();
        assert_ne!(cursor, "0");

        let second = run(&db, &format!("scan {} count 3", cursor));
        assert_eq!(second, RespValue::array(vec![bulk("0"), bulks(&["k3", "k4"])]));
    }

    #[test]
    fn test_scan_filters() {
        let db = Db::new();
        run(&db, "set a1 v");
        run(&db, "rpush a2 v");
        run(&db, "set b1 v");
        assert_eq!(
            run(&db, "scan 0 match a* type string"),
            RespValue::array(vec![bulk("0"), bulks(&["a1"])])
        );
        assert_eq!(run(&db, "scan x"), err("ERR invalid cursor (scan)"));
        assert_eq!(run(&db, "scan 0 type blob"), err("ERR syntax error (scan)"));
        assert_eq!(run(&db, "scan 0 count"), err("ERR syntax error (scan)"));

        let empty_type = vec![
            Bytes::from("scan"),
            Bytes::from("0"),
            Bytes::from("type"),
            Bytes::new(),
        ];
        let rejected = parse(empty_type).map(|_| ()).unwrap_err();
        assert_eq!(rejected.error, Error::SyntaxError);
    }

    #[test]
    fn test_scan_huge_count() {
        let db = Db::new();
        run(&db, "set a v");
        run(&db, "set b v");
        assert_eq!(
            run(&db, "scan 0 count 18446744073709551615"),
            RespValue::array(vec![bulk("0"), bulks(&["a", "b"])])
        );
    }

    #[test]
    fn test_rename() {
        let db = Db::new();
        run(&db, "set a 1");
        run(&db, "set b 2");
        assert_eq!(run(&db, "renamenx a b"), int(0));
        assert_eq!(run(&db, "rename a b"), RespValue::ok());
        assert_eq!(run(&db, "get b"), bulk("1"));
        assert_eq!(run(&db, "renamenx b c"), int(1));
        assert_eq!(run(&db, "renamenx nope c"), err("ERR no such key (renamenx)"));
    }

    #[test]
    fn test_randomkey() {
        let db = Db::new();
        assert_eq!(run(&db, "randomkey"), RespValue::Null);
        run(&db, "set only v");
        assert_eq!(run(&db, "randomkey"), bulk("only"));
    }
}
