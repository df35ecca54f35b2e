//! Active Expiry
//!
//! Reads already hide expired keys, but a key that expires and is never
//! touched again would stay in the keyspace forever. The sweeper is a
//! background Tokio task that periodically calls [`Db::delete_expired`].
//!
//! The sweep interval adapts to the expiry rate: when a large fraction of
//! the keyspace expired since the last sweep the interval halves (down to
//! `min_interval`), and when nothing expired it doubles (up to
//! `max_interval`).

use crate::storage::Db;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Sweeper timing.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Starting interval between sweeps
    pub base_interval: Duration,
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// Fraction of expired keys above which sweeps speed up
    pub speedup_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
        }
    }
}

/// Handle to the running sweeper. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current Tokio runtime.
    pub fn start(db: Arc<Db>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(sweep(db, config, shutdown_rx));
        info!("Expiry sweeper started");
        Self { shutdown_tx }
    }

    pub fn stop(&self) {
        if self.shutdown_tx.send(true).is_ok() {
            info!("Expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweep(db: Arc<Db>, config: ExpiryConfig, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper shutting down");
                    return;
                }
            }
        }

        let total = db.len();
        let expired = db.delete_expired();

        if expired == 0 {
            interval = (interval * 2).min(config.max_interval);
            trace!(interval_ms = interval.as_millis(), "Nothing expired");
            continue;
        }

        let rate = expired as f64 / total.max(1) as f64;
        if rate > config.speedup_threshold {
            interval = (interval / 2).max(config.min_interval);
        }
        debug!(
            expired,
            remaining = db.len(),
            interval_ms = interval.as_millis(),
            "Expired keys removed"
        );
    }
}

/// Starts the sweeper with default timing.
pub fn start_expiry_sweeper(db: Arc<Db>) -> ExpirySweeper {
    ExpirySweeper::start(db, ExpiryConfig::default())
}
