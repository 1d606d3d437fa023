//! Monitored catalog transactions
//!
//! Wraps sqlx transactions to log how long a connection waited and how long
//! it was held. Write transactions additionally hold the catalog's write lock
//! until they are committed, rolled back, or dropped.

use std::sync::Arc;
use std::time::Instant;

use sqlx::{Sqlite, SqliteConnection, Transaction};
use stash_common::{Error, Result};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Monitored transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction {
    tx: Option<Transaction<'static, Sqlite>>,
    _write_guard: Option<OwnedMutexGuard<()>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl MonitoredTransaction {
    /// Commit the transaction and log release timing
    pub async fn commit(mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already consumed".to_string()))?;
        tx.commit().await?;

        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms,
                "LONG TRANSACTION - write lock held for extended period"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms, "Connection released (commit)");
        }

        Ok(())
    }

    /// Roll back the transaction and log release timing
    pub async fn rollback(mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already consumed".to_string()))?;
        tx.rollback().await?;

        tracing::debug!(
            caller = self.caller,
            held_ms = self.acquired_at.elapsed().as_millis(),
            "Connection released (rollback)"
        );

        Ok(())
    }

    /// Connection the transaction runs on
    pub fn conn(&mut self) -> Result<&mut SqliteConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(Error::Internal("Transaction already consumed".to_string())),
        }
    }
}

impl Drop for MonitoredTransaction {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let held_ms = self.acquired_at.elapsed().as_millis();
            if held_ms > 2000 {
                tracing::warn!(
                    caller = self.caller,
                    held_ms,
                    "LONG TRANSACTION DROPPED - rolled back via Drop (error path?)"
                );
            } else {
                tracing::debug!(caller = self.caller, held_ms, "Connection released (drop)");
            }
        }
    }
}

/// Begin a monitored transaction.
///
/// With `write_lock`, the lock is acquired first and held for the life of the
/// transaction, serialising writers in-process before SQLite has to.
pub async fn begin_monitored(
    pool: &sqlx::SqlitePool,
    write_lock: Option<Arc<Mutex<()>>>,
    caller: &'static str,
) -> Result<MonitoredTransaction> {
    let start = Instant::now();
    tracing::trace!(caller, "Connection acquisition requested");

    let write_guard = match write_lock {
        Some(lock) => Some(lock.lock_owned().await),
        None => None,
    };

    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 1000 {
        tracing::warn!(caller, wait_ms, "SLOW TRANSACTION START - waited for write lock or pool");
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction {
        tx: Some(tx),
        _write_guard: write_guard,
        caller,
        acquired_at: Instant::now(),
    })
}
