//! Bounded worker pools
//!
//! A pool is an mpsc queue drained by a fixed number of worker tasks. Each
//! submitted unit runs to completion on one worker; the submitter awaits its
//! result over a oneshot channel. Pools are independent, so work queued on
//! one never waits behind work queued on another.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::{ImportError, ImportResult};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Queue capacity per pool; submitters wait when it is full
const QUEUE_CAPACITY: usize = 256;

/// Fixed-size worker pool
///
/// Must be created from within a Tokio runtime. Workers exit once the pool
/// is dropped and the queue drains.
pub struct WorkerPool {
    name: &'static str,
    tx: mpsc::Sender<Job>,
    workers: usize,
    pending: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(name: &'static str, workers: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<Job>(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..workers {
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    // Hold the receiver lock only while waiting for the next job
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(job) => job.await,
                        None => break,
                    }
                }
                tracing::debug!(pool = name, worker_id, "Worker stopped");
            });
        }

        tracing::debug!(pool = name, workers, "Worker pool started");

        Self {
            name,
            tx,
            workers,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Units submitted but not yet finished
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Run `work` on the pool and wait for its output
    ///
    /// A panic inside `work` is reported as [`ImportError::Internal`] and does
    /// not take the worker down. Dropping the returned future abandons the
    /// result but not the unit itself.
    pub async fn run<F, T>(&self, work: F) -> ImportResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let pending = self.pending.clone();
        let name = self.name;

        let job: Job = Box::pin(async move {
            let result = AssertUnwindSafe(work).catch_unwind().await;
            pending.fetch_sub(1, Ordering::SeqCst);

            if result.is_err() {
                tracing::error!(pool = name, "Work unit panicked");
            }
            // The submitter may have stopped waiting
            let _ = result_tx.send(result);
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).await.is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(ImportError::PoolClosed(self.name));
        }

        match result_rx.await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(_)) => Err(ImportError::Internal(format!(
                "Work unit panicked on pool '{}'",
                self.name
            ))),
            Err(_) => Err(ImportError::PoolClosed(self.name)),
        }
    }
}
