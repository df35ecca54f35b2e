//! Connection and server commands.

use crate::args::{bytes, flag, int, one_of, opt_bytes, Parser};
use crate::commands::{base, Base, Command, Control, Error, ParseFn};
use crate::protocol::RespValue;
use crate::storage::{unix_millis, Tx};
use bytes::Bytes;
use std::collections::HashMap;

pub(super) fn register(r: &mut HashMap<&'static str, ParseFn>) {
    r.insert("ping", Ping::parse);
    r.insert("echo", Echo::parse);
    r.insert("select", Select::parse);
    r.insert("dbsize", DbSize::parse);
    r.insert("flushdb", Flush::parse);
    r.insert("flushall", Flush::parse);
    r.insert("time", Time::parse);
    r.insert("command", CommandInfo::parse);
    r.insert("multi", SessionControl::parse);
    r.insert("exec", SessionControl::parse);
    r.insert("discard", SessionControl::parse);
    r.insert("monitor", SessionControl::parse);
    r.insert("quit", SessionControl::parse);
}

/// PING [message]
#[derive(Debug)]
pub struct Ping {
    base: Base,
    message: Option<Bytes>,
}

impl Ping {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut message = None;
        Parser::new().arg(opt_bytes(&mut message)).run(base.args())?;
        Ok(Box::new(Ping { base, message }))
    }
}

impl Command for Ping {
    base!();

    fn exec(&self, _tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(match &self.message {
            Some(message) => RespValue::bulk_string(message.clone()),
            None => RespValue::simple_string("PONG"),
        })
    }
}

/// ECHO message
#[derive(Debug)]
pub struct Echo {
    base: Base,
    message: Bytes,
}

impl Echo {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut message = Bytes::new();
        Parser::new()
            .arg(bytes(&mut message))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(Echo { base, message }))
    }
}

impl Command for Echo {
    base!();

    fn exec(&self, _tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(RespValue::bulk_string(self.message.clone()))
    }
}

/// SELECT index
///
/// There is a single keyspace; any non-negative index is accepted.
#[derive(Debug)]
pub struct Select {
    base: Base,
}

impl Select {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut index: u32 = 0;
        Parser::new()
            .arg(int(&mut index))
            .required(1)
            .run(base.args())?;
        Ok(Box::new(Select { base }))
    }
}

impl Command for Select {
    base!();

    fn exec(&self, _tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(RespValue::ok())
    }
}

/// DBSIZE
#[derive(Debug)]
pub struct DbSize {
    base: Base,
}

impl DbSize {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        Parser::new().run(base.args())?;
        Ok(Box::new(DbSize { base }))
    }
}

impl Command for DbSize {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(tx.key().len().into())
    }
}

/// FLUSHDB [ASYNC|SYNC], FLUSHALL [ASYNC|SYNC]
#[derive(Debug)]
pub struct Flush {
    base: Base,
}

impl Flush {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let (mut is_async, mut is_sync) = (false, false);
        Parser::new()
            .opt(one_of(flag("async", &mut is_async), flag("sync", &mut is_sync)))
            .run(base.args())?;
        Ok(Box::new(Flush { base }))
    }
}

impl Command for Flush {
    base!();

    fn exec(&self, tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        tx.key().delete_all();
        Ok(RespValue::ok())
    }
}

/// TIME
#[derive(Debug)]
pub struct Time {
    base: Base,
}

impl Time {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        Parser::new().run(base.args())?;
        Ok(Box::new(Time { base }))
    }
}

impl Command for Time {
    base!();

    fn exec(&self, _tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let now_ms = unix_millis();
        let (secs, micros) = (now_ms / 1000, (now_ms % 1000) * 1000);
        Ok(RespValue::bulk_array([secs.to_string(), micros.to_string()]))
    }
}

/// COMMAND COUNT, COMMAND LIST
#[derive(Debug)]
pub struct CommandInfo {
    base: Base,
    list: bool,
}

impl CommandInfo {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let mut sub = Bytes::new();
        Parser::new()
            .arg(bytes(&mut sub))
            .required(1)
            .run(base.args())?;
        let list = if sub.eq_ignore_ascii_case(b"count") {
            false
        } else if sub.eq_ignore_ascii_case(b"list") {
            true
        } else {
            return Err(Error::UnknownSubcmd);
        };
        Ok(Box::new(CommandInfo { base, list }))
    }
}

impl Command for CommandInfo {
    base!();

    fn exec(&self, _tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        let names = crate::commands::names();
        if self.list {
            return Ok(RespValue::bulk_array(names));
        }
        Ok(names.len().into())
    }
}

/// MULTI, EXEC, DISCARD, MONITOR, QUIT
///
/// Handled by the connection session; `exec` only runs if one of these
/// ends up outside a session.
#[derive(Debug)]
pub struct SessionControl {
    base: Base,
    control: Control,
}

impl SessionControl {
    pub fn parse(base: Base) -> Result<Box<dyn Command>, Error> {
        let control = match base.name() {
            "multi" => Control::Multi,
            "exec" => Control::Exec,
            "discard" => Control::Discard,
            "monitor" => Control::Monitor,
            "quit" => Control::Quit,
            _ => return Err(Error::UnknownCmd),
        };
        Parser::new().run(base.args())?;
        Ok(Box::new(SessionControl { base, control }))
    }
}

impl Command for SessionControl {
    base!();

    fn control(&self) -> Option<Control> {
        Some(self.control)
    }

    fn exec(&self, _tx: &mut Tx<'_>) -> Result<RespValue, Error> {
        Ok(RespValue::ok())
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::tests::{bulk, err, run};
    use crate::commands::{parse, tests::tokens, Control};
    use crate::protocol::RespValue;
    use crate::storage::Db;

    #[test]
    fn test_ping_echo() {
        let db = Db::new();
        assert_eq!(run(&db, "ping"), RespValue::simple_string("PONG"));
        assert_eq!(run(&db, "ping hi"), bulk("hi"));
        assert_eq!(run(&db, "echo hello"), bulk("hello"));
        assert_eq!(run(&db, "echo"), err("ERR wrong number of arguments (echo)"));
    }

    #[test]
    fn test_select() {
        let db = Db::new();
        assert_eq!(run(&db, "select 0"), RespValue::ok());
        assert_eq!(run(&db, "select x"), err("ERR value is not an integer (select)"));
    }

    #[test]
    fn test_dbsize_and_flush() {
        let db = Db::new();
        run(&db, "set a 1");
        run(&db, "rpush b x");
        assert_eq!(run(&db, "dbsize"), RespValue::Integer(2));
        assert_eq!(run(&db, "flushdb"), RespValue::ok());
        assert_eq!(run(&db, "dbsize"), RespValue::Integer(0));
        assert_eq!(run(&db, "flushall async sync"), err("ERR syntax error (flushall)"));
    }

    #[test]
    fn test_time() {
        let db = Db::new();
        let reply = run(&db, "time");
        let parts = reply.as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].as_str().unwrap().parse::<i64>().unwrap() > 1_600_000_000);
    }

    #[test]
    fn test_command_subcommands() {
        let db = Db::new();
        let count = run(&db, "command count").as_integer().unwrap();
        assert_eq!(count as usize, crate::commands::names().len());

        let reply = run(&db, "COMMAND LIST");
        let names: Vec<&str> = reply
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|n| n.as_str())
            .collect();
        assert_eq!(names.len() as i64, count);
        assert!(names.contains(&"zunionstore"));
        assert!(names.contains(&"command"));

        assert_eq!(
            run(&db, "command docs"),
            err("ERR unknown subcommand (command)")
        );
        assert_eq!(
            run(&db, "command"),
            err("ERR wrong number of arguments (command)")
        );
    }

    #[test]
    fn test_control_commands() {
        for (line, control) in [
            ("MULTI", Control::Multi),
            ("exec", Control::Exec),
            ("Discard", Control::Discard),
            ("monitor", Control::Monitor),
            ("quit", Control::Quit),
        ] {
            assert_eq!(parse(tokens(line)).unwrap().control(), Some(control));
        }
        assert_eq!(parse(tokens("ping")).unwrap().control(), None);
        assert_eq!(
            parse(tokens("multi now")).unwrap_err().error,
            crate::commands::Error::SyntaxError
        );
    }
}
