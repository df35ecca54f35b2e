//! Per-connection Session State
//!
//! ```text
//!              MULTI                       other cmd
//!   ┌────────┐ ─────────────────────> ┌───────────┐ ──┐ QUEUED
//!   │ Normal │                        │ Queueing  │ <─┘
//!   └────────┘ <───────────────────── └───────────┘
//!       ▲        EXEC (run batch) /        │ MULTI: NestedMulti,
//!       │        DISCARD                   │ queue cleared
//!       └─ other cmd: run now              ▼
//! ```
//!
//! A session is owned by exactly one connection, so nothing here is locked.
//! EXEC runs the whole queue inside one [`Db::transact`] call: a domain
//! error in any queued command rolls back every storage effect of the
//! batch, while the replies already written for earlier commands stay in
//! the output.

use crate::commands::{self, Command, Control, Error};
use crate::protocol::{RespValue, Writer};
use crate::storage::Db;
use bytes::Bytes;
use tracing::debug;

/// What the connection should do after a command was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep reading commands
    Continue,
    /// Switch the connection into monitor mode
    Monitor,
    /// Flush pending replies and close
    Quit,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Normal,
    Queueing(Vec<Box<dyn Command>>),
}

/// MULTI/EXEC/DISCARD state of one connection.
#[derive(Debug, Default)]
pub struct Session {
    state: State,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_queueing(&self) -> bool {
        matches!(self.state, State::Queueing(_))
    }

    /// Number of commands waiting for EXEC.
    pub fn queued(&self) -> usize {
        match &self.state {
            State::Normal => 0,
            State::Queueing(queue) => queue.len(),
        }
    }

    /// Parses and handles one token array, writing every reply to `w`.
    pub fn handle(&mut self, db: &Db, tokens: Vec<Bytes>, w: &mut dyn Writer) -> Outcome {
        let cmd = match commands::parse(tokens) {
            Ok(cmd) => cmd,
            Err(err) => {
                // never queued, never executed
                w.write_error(&err.to_string());
                return Outcome::Continue;
            }
        };

        match cmd.control() {
            Some(Control::Multi) => self.multi(cmd.as_ref(), w),
            Some(Control::Exec) => self.exec(db, cmd.as_ref(), w),
            Some(Control::Discard) => self.discard(cmd.as_ref(), w),
            Some(Control::Monitor) => {
                if self.is_queueing() {
                    w.write_error(&cmd.describe_error(&Error::NotAllowedInMulti));
                    return Outcome::Continue;
                }
                w.write_value(&RespValue::ok());
                return Outcome::Monitor;
            }
            Some(Control::Quit) => {
                w.write_value(&RespValue::ok());
                return Outcome::Quit;
            }
            None => match &mut self.state {
                State::Queueing(queue) => {
                    queue.push(cmd);
                    w.write_value(&RespValue::queued());
                }
                State::Normal => {
                    if let Err(err) = db.transact(|tx| cmd.run(w, tx)) {
                        debug!(command = cmd.name(), error = %err, "Command failed");
                    }
                }
            },
        }
        Outcome::Continue
    }

    fn multi(&mut self, cmd: &dyn Command, w: &mut dyn Writer) {
        match &mut self.state {
            State::Normal => {
                self.state = State::Queueing(Vec::new());
                w.write_value(&RespValue::ok());
            }
            State::Queueing(queue) => {
                queue.clear();
                w.write_error(&cmd.describe_error(&Error::NestedMulti));
            }
        }
    }

    fn discard(&mut self, cmd: &dyn Command, w: &mut dyn Writer) {
        match std::mem::take(&mut self.state) {
            State::Normal => w.write_error(&cmd.describe_error(&Error::NotInMulti)),
            State::Queueing(_) => w.write_value(&RespValue::ok()),
        }
    }

    fn exec(&mut self, db: &Db, cmd: &dyn Command, w: &mut dyn Writer) {
        let queue = match std::mem::take(&mut self.state) {
            State::Normal => {
                w.write_error(&cmd.describe_error(&Error::NotInMulti));
                return;
            }
            State::Queueing(queue) => queue,
        };

        if let Err(err) = run_batch(db, &queue, w) {
            debug!(queued = queue.len(), error = %err, "Transaction aborted");
        }
    }
}

/// Runs `queue` in order inside one transaction.
///
/// Writes an array header sized to the queue, then one reply per command.
/// When a command fails, every later slot is filled with
/// [`Error::ExecAborted`] and the transaction is rolled back.
pub fn run_batch(
    db: &Db,
    queue: &[Box<dyn Command>],
    w: &mut dyn Writer,
) -> Result<Vec<RespValue>, Error> {
    w.write_array(queue.len());
    db.transact(|tx| {
        let mut results = Vec::with_capacity(queue.len());
        for (i, cmd) in queue.iter().enumerate() {
            match cmd.run(w, tx) {
                Ok(value) => results.push(value),
                Err(err) => {
                    for rest in &queue[i + 1..] {
                        w.write_error(&rest.describe_error(&Error::ExecAborted));
                    }
                    return Err(err);
                }
            }
        }
        Ok(results)
    })
}
