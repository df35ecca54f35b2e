//! String commands.

use crate::args::{any_map, bytes, flag, float, int, named, one_of, opt_int, strings, Parser};
use crate::commands::{base, Base, Command, Error, ParseFn};
use crate::protocol::RespValue;
use crate::storage::{self, SetOptions, Tx};
use bytes::Bytes;
use std::collections::HashMap;

pub(super) fn register(r: &mut HashMap<&'static str, ParseFn>) {
    r.insert("get", Get::parse);
    r.insert("set", Set::parse);
    r.insert("setnx", Set::parse_nx);
    r.insert("setex", Set::parse_ex);
    r.insert("psetex", Set::parse_ex);
    r.insert("getset", GetSet::parse);
    r.insert("getdel", GetDel::parse);
    r.insert("append", Append::parse);
    r.insert("mget", MGet::parse);
    r.insert("mset", MSet::parse);
    r.insert("incr", Incr::parse);
    r.insert("decr", Incr::parse);
    r.insert("incrby", Incr::parse_by);
    r.insert("decrby", Incr::parse_by);
    r.insert("incrbyfloat", IncrFloat::parse);
    r.insert("strlen", StrLen::parse);
}

/// For the INCR family a value-type error means the stored value is not
/// a number.
pub(super) fn not_an_int(err: storage::Error) -> Error {
    match err {
        storage::Error::ValueType => Error::InvalidInt,
        other => other.into(),
    }
}

pub(super) fn not_a_float(err: storage::Error) -> Error {
    match err {
        storage::Error::ValueType => Error::InvalidFloat,
        other => other.into(),
    }
}

/// GET key
#[derive(Debug)]
pub struct Get {
    base: Base,
    key: Bytes,
}

impl Get {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        Parser::new()
            .arg(bytes(&mut key))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(Get { base, key }))
    }
}

impl Command for Get {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.str().get(&self.key)?.into())
    }
}

/// When a SET expires the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    /// Milliseconds from now
    In(i64),
    /// Unix milliseconds
    At(i64),
    Keep,
}

/// SET key value [NX|XX] [GET] [EX s|PX ms|EXAT s|PXAT ms|KEEPTTL]
///
/// Also SETNX key value, SETEX key seconds value, PSETEX key ms value.
#[derive(Debug)]
pub struct Set {
    base: Base,
    key: Bytes,
    value: Bytes,
    if_not_exists: bool,
    if_exists: bool,
    get: bool,
    expiry: Option<Expiry>,
}

impl Set {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut value) = (Bytes::new(), Bytes::new());
        let (mut nx, mut xx, mut get, mut keep_ttl) = (false, false, false, false);
        let (mut ex, mut px, mut exat, mut pxat) = (None, None, None, None);
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut value))
            .opt(one_of(flag("nx", &mut nx), flag("xx", &mut xx)))
            .opt(flag("get", &mut get))
            .opt(
                one_of(named("ex", opt_int(&mut ex)), named("px", opt_int(&mut px)))
                    .or(named("exat", opt_int(&mut exat)))
                    .or(named("pxat", opt_int(&mut pxat)))
                    .or(flag("keepttl", &mut keep_ttl)),
            )
            .required(2)
            .run(base.args())?;

        let expiry = match (ex, px, exat, pxat) {
            (Some(s), ..) => Some(Expiry::In(seconds(s)?)),
            (_, Some(ms), ..) => Some(Expiry::In(positive(ms)?)),
            (_, _, Some(s), _) => Some(Expiry::At(seconds(s)?)),
            (.., Some(ms)) => Some(Expiry::At(positive(ms)?)),
            _ if keep_ttl => Some(Expiry::Keep),
            _ => None,
        };

        Ok(Box::new(Set {
            base,
            key,
            value,
            if_not_exists: nx,
            if_exists: xx,
            get,
            expiry,
        }))
    }

    /// SETNX key value
    pub fn parse_nx(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut value) = (Bytes::new(), Bytes::new());
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut value))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(Set {
            base,
            key,
            value,
            if_not_exists: true,
            if_exists: false,
            get: false,
            expiry: None,
        }))
    }

    /// SETEX key seconds value, PSETEX key ms value
    pub fn parse_ex(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut value) = (Bytes::new(), Bytes::new());
        let mut ttl: i64 = 0;
        Parser::new()
            .arg(bytes(&mut key))
            .arg(int(&mut ttl))
            .arg(bytes(&mut value))
            .required(3)
            .run(base.args())?;
        let ttl = if base.name() == "setex" {
            seconds(ttl)?
        } else {
            positive(ttl)?
        };
        Ok(Box::new(Set {
            base,
            key,
            value,
            if_not_exists: false,
            if_exists: false,
            get: false,
            expiry: Some(Expiry::In(ttl)),
        }))
    }

    fn options(&self, now: i64) -> SetOptions {
        let mut opts = SetOptions {
            if_not_exists: self.if_not_exists,
            if_exists: self.if_exists,
            ..Default::default()
        };
        match self.expiry {
            Some(Expiry::In(ms)) => opts.expires_at = Some(now.saturating_add(ms)),
            Some(Expiry::At(at)) => opts.expires_at = Some(at),
            Some(Expiry::Keep) => opts.keep_ttl = true,
            None => {}
        }
        opts
    }
}

fn positive(ms: i64) -> Result<i64, Error> {
    if ms > 0 {
        Ok(ms)
    } else {
        Err(Error::InvalidExpireTime)
    }
}

fn seconds(s: i64) -> Result<i64, Error> {
    positive(s)?.checked_mul(1000).ok_or(Error::InvalidExpireTime)
}

impl Command for Set {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let opts = self.options(tx.now());
        let out = tx.str().set_with(&self.key, self.value.clone(), opts)?;
        Ok(match self.name() {
            "setnx" => out.updated.into(),
            _ if self.get => out.prev.into(),
            _ if out.updated => RespValue::ok(),
            _ => RespValue::Null,
        })
    }
}

/// GETSET key value
#[derive(Debug)]
pub struct GetSet {
    base: Base,
    key: Bytes,
    value: Bytes,
}

impl GetSet {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut value) = (Bytes::new(), Bytes::new());
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut value))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(GetSet { base, key, value }))
    }
}

impl Command for GetSet {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.str().get_set(&self.key, self.value.clone())?.into())
    }
}

/// GETDEL key
#[derive(Debug)]
pub struct GetDel {
    base: Base,
    key: Bytes,
}

impl GetDel {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        Parser::new()
            .arg(bytes(&mut key))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(GetDel { base, key }))
    }
}

impl Command for GetDel {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.str().get_del(&self.key)?.into())
    }
}

/// APPEND key value
#[derive(Debug)]
pub struct Append {
    base: Base,
    key: Bytes,
    value: Bytes,
}

impl Append {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut key, mut value) = (Bytes::new(), Bytes::new());
        Parser::new()
            .arg(bytes(&mut key))
            .arg(bytes(&mut value))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(Append { base, key, value }))
    }
}

impl Command for Append {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.str().append(&self.key, &self.value)?.into())
    }
}

/// MGET key [key ...]
#[derive(Debug)]
pub struct MGet {
    base: Base,
    keys: Vec<Bytes>,
}

impl MGet {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut keys = Vec::new();
        Parser::new()
            .arg(strings(&mut keys))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(MGet { base, keys }))
    }
}

impl Command for MGet {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.str().get_many(&self.keys).into())
    }
}

/// MSET key value [key value ...]
#[derive(Debug)]
pub struct MSet {
    base: Base,
    items: Vec<(Bytes, Bytes)>,
}

impl MSet {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut items = Vec::new();
        Parser::new()
            .arg(any_map(&mut items))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(MSet { base, items }))
    }
}

impl Command for MSet {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        tx.str().set_many(&self.items)?;
        Ok(RespValue::ok())
    }
}

/// INCR key, DECR key, INCRBY key delta, DECRBY key delta
#[derive(Debug)]
pub struct Incr {
    base: Base,
    key: Bytes,
    delta: i64,
}

impl Incr {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        Parser::new()
            .arg(bytes(&mut key))
            .required(1)
            .run(base.args())?;
        let delta = if base.name() == "decr" { -1 } else { 1 };
        Ok(Box::new(Incr { base, key, delta }))
    }

    pub fn parse_by(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut delta: i64 = 0;
        Parser::new()
            .arg(bytes(&mut key))
            .arg(int(&mut delta))
            .required(2)
            .run(base.args())?;
        if base.name() == "decrby" {
            delta = delta.checked_neg().ok_or(Error::InvalidInt)?;
        }
        Ok(Box::new(Incr { base, key, delta }))
    }
}

impl Command for Incr {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let n = tx.str().incr(&self.key, self.delta).map_err(not_an_int)?;
        Ok(n.into())
    }
}

/// INCRBYFLOAT key delta
#[derive(Debug)]
pub struct IncrFloat {
    base: Base,
    key: Bytes,
    delta: f64,
}

impl IncrFloat {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        let mut delta = 0.0;
        Parser::new()
            .arg(bytes(&mut key))
            .arg(float(&mut delta))
            .required(2)
            .run(base.args())?;
        Ok(Box::new(IncrFloat { base, key, delta }))
    }
}

impl Command for IncrFloat {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let n = tx
            .str()
            .incr_float(&self.key, self.delta)
            .map_err(not_a_float)?;
        Ok(RespValue::float(n))
    }
}

/// STRLEN key
#[derive(Debug)]
pub struct StrLen {
    base: Base,
    key: Bytes,
}

impl StrLen {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut key = Bytes::new();
        Parser::new()
            .arg(bytes(&mut key))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(StrLen { base, key }))
    }
}

impl Command for StrLen {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.str().len(&self.key)?.into())
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::tests::{bulk, err, run};
    use crate::protocol::RespValue;
    use crate::storage::Db;

    #[test]
    fn test_get_set() {
        let db = Db::new();
        assert_eq!(run(&db, "get k"), RespValue::Null);
        assert_eq!(run(&db, "set k v"), RespValue::ok());
        assert_eq!(run(&db, "get k"), bulk("v"));
        assert_eq!(run(&db, "strlen k"), RespValue::Integer(1));
    }

    #[test]
    fn test_set_conditions() {
        let db = Db::new();
        assert_eq!(run(&db, "set k 1 xx"), RespValue::Null);
        assert_eq!(run(&db, "set k 1 nx"), RespValue::ok());
        assert_eq!(run(&db, "set k 2 nx"), RespValue::Null);
        assert_eq!(run(&db, "set k 3 xx get"), bulk("1"));
        assert_eq!(run(&db, "get k"), bulk("3"));
        assert_eq!(run(&db, "set k 4 nx xx"), err("ERR syntax error (set)"));
    }

    #[test]
    fn test_set_expiry() {
        let db = Db::new();
        assert_eq!(run(&db, "set k v ex 100"), RespValue::ok());
        assert_eq!(run(&db, "ttl k"), RespValue::Integer(100));
        assert_eq!(run(&db, "set k w keepttl"), RespValue::ok());
        assert_eq!(run(&db, "ttl k"), RespValue::Integer(100));
        assert_eq!(run(&db, "set k x"), RespValue::ok());
        assert_eq!(run(&db, "ttl k"), RespValue::Integer(-1));

        assert_eq!(run(&db, "set k v ex 0"), err("ERR invalid expire time (set)"));
        assert_eq!(run(&db, "set k v px -5"), err("ERR invalid expire time (set)"));
        assert_eq!(run(&db, "set k v ex 1 px 1"), err("ERR syntax error (set)"));

        assert_eq!(run(&db, "set old v pxat 1000"), RespValue::ok());
        assert_eq!(run(&db, "exists old"), RespValue::Integer(0));
    }

    #[test]
    fn test_setnx_setex() {
        let db = Db::new();
        assert_eq!(run(&db, "setnx k 1"), RespValue::Integer(1));
        assert_eq!(run(&db, "setnx k 2"), RespValue::Integer(0));
        assert_eq!(run(&db, "setex k 10 3"), RespValue::ok());
        assert_eq!(run(&db, "get k"), bulk("3"));
        assert_eq!(run(&db, "ttl k"), RespValue::Integer(10));
        assert_eq!(run(&db, "psetex k 0 3"), err("ERR invalid expire time (psetex)"));
    }

    #[test]
    fn test_getset_getdel_append() {
        let db = Db::new();
        assert_eq!(run(&db, "getset k a"), RespValue::Null);
        assert_eq!(run(&db, "getset k b"), bulk("a"));
        assert_eq!(run(&db, "append k cd"), RespValue::Integer(3));
        assert_eq!(run(&db, "getdel k"), bulk("bcd"));
        assert_eq!(run(&db, "getdel k"), RespValue::Null);
    }

    #[test]
    fn test_mget_mset() {
        let db = Db::new();
        assert_eq!(run(&db, "mset a 1 b 2"), RespValue::ok());
        run(&db, "rpush l x");
        assert_eq!(
            run(&db, "mget a l b c"),
            RespValue::array(vec![bulk("1"), RespValue::Null, bulk("2"), RespValue::Null])
        );
        assert_eq!(run(&db, "mset a 1 b"), err("ERR wrong number of arguments (mset)"));
        assert_eq!(run(&db, "mget"), err("ERR wrong number of arguments (mget)"));
    }

    #[test]
    fn test_incr_family() {
        let db = Db::new();
        assert_eq!(run(&db, "incr n"), RespValue::Integer(1));
        assert_eq!(run(&db, "incrby n 10"), RespValue::Integer(11));
        assert_eq!(run(&db, "decr n"), RespValue::Integer(10));
        assert_eq!(run(&db, "decrby n 4"), RespValue::Integer(6));
        assert_eq!(run(&db, "incrbyfloat n 0.5"), bulk("6.5"));

        run(&db, "set s abc");
        assert_eq!(run(&db, "incr s"), err("ERR value is not an integer (incr)"));
        assert_eq!(run(&db, "incrbyfloat s 1"), err("ERR value is not a float (incrbyfloat)"));
        assert_eq!(run(&db, "incrby n x"), err("ERR value is not an integer (incrby)"));

        run(&db, "rpush l x");
        assert_eq!(run(&db, "incr l"), err("ERR key type mismatch (incr)"));
    }
}
