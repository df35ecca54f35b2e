//! MONITOR Broadcast
//!
//! A process-wide registry of subscribers. Every command received by a
//! non-subscriber connection is formatted into one line and pushed to each
//! subscriber's channel; the subscriber's own connection task writes and
//! flushes it.
//!
//! ```text
//!   conn A ──┐                               ┌──> subscriber 1 ──> socket
//!   conn B ──┼── broadcast(line) ─ RwLock ───┤
//!   conn C ──┘   (read lock)                 └──> subscriber 2 ──> socket
//! ```
//!
//! Subscribing and unsubscribing take the write lock. An atomic count lets
//! `broadcast` return before touching the lock when nobody is listening.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::trace;

/// The subscriber registry.
#[derive(Debug, Default)]
pub struct Monitor {
    subscribers: RwLock<HashMap<u64, mpsc::UnboundedSender<Bytes>>>,
    count: AtomicUsize,
    next_id: AtomicU64,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber. It stays registered until the returned
    /// [`Subscription`] is dropped.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        subscribers.insert(id, tx);
        self.count.store(subscribers.len(), Ordering::Release);
        drop(subscribers);

        Subscription {
            id,
            rx,
            monitor: Arc::clone(self),
        }
    }

    fn unsubscribe(&self, id: u64) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        subscribers.remove(&id);
        self.count.store(subscribers.len(), Ordering::Release);
    }

    /// Number of registered subscribers.
    pub fn subscribers(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Sends one command to every subscriber.
    pub fn broadcast(&self, db: usize, addr: &SocketAddr, tokens: &[Bytes]) {
        if self.subscribers() == 0 {
            return;
        }

        let line = format_line(now(), db, addr, tokens);
        let frame = Bytes::from(format!("+{}\r\n", line));

        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
            for (id, tx) in subscribers.iter() {
                if tx.send(frame.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }

        for id in dead {
            trace!(subscriber = id, "Dropping closed monitor subscriber");
            self.unsubscribe(id);
        }
    }
}

/// A registered subscriber. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Bytes>,
    monitor: Arc<Monitor>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next encoded line.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.monitor.unsubscribe(self.id);
    }
}

fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Formats `<sec>.<usec> [<db> <addr>] "<arg0>" "<arg1>" ...`.
pub fn format_line(at: Duration, db: usize, addr: &SocketAddr, tokens: &[Bytes]) -> String {
    let mut line = format!("{}.{:06} [{} {}]", at.as_secs(), at.subsec_micros(), db, addr);
    for token in tokens {
        line.push_str(" \"");
        quote_into(&mut line, token);
        line.push('"');
    }
    line
}

/// Escapes quotes, backslashes and non-printable bytes.
fn quote_into(out: &mut String, data: &[u8]) {
    for &b in data {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{:02x}", b);
            }
        }
    }
}
