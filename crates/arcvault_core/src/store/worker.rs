//! Background worker pool for commit, delete and startup recovery.

use super::PendingOp;
use crate::error::CoreResult;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::oneshot;
use tracing::{debug, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Bounded pool of blocking worker threads.
///
/// A multi-thread tokio runtime is used only for `spawn_blocking`; its async
/// side runs a single thread. Results come back through [`PendingOp`].
#[derive(Debug)]
pub(crate) struct WorkerPool {
    runtime: Option<Runtime>,
}

impl WorkerPool {
    /// Starts a pool of at most `threads` blocking workers.
    pub(crate) fn new(threads: usize) -> CoreResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads.max(1))
            .thread_name("arcvault-worker")
            .build()?;
        debug!(threads = threads.max(1), "started worker pool");
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    /// Runs `op` on a worker; the caller only blocks if it waits on the result.
    pub(crate) fn submit<T, F>(&self, op: F) -> PendingOp<T>
    where
        T: Send + 'static,
        F: FnOnce() -> CoreResult<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        match &self.runtime {
            Some(runtime) => {
                runtime.spawn_blocking(move || {
                    // A dropped PendingOp means nobody wants the result.
                    let _ = tx.send(op());
                });
            }
            None => drop(tx),
        }
        PendingOp::new(rx)
    }

    /// Stops accepting work and waits for running operations to finish.
    ///
    /// Inside an async context the wait is skipped and running operations
    /// are left to complete on their own.
    pub(crate) fn shutdown(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        if Handle::try_current().is_ok() {
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
        }
        debug!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            warn!("worker pool dropped without shutdown");
            runtime.shutdown_background();
        }
    }
}
