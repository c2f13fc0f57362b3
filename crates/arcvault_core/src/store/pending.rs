//! Handle on an operation running on the background worker pool.

use crate::error::{CoreError, CoreResult};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot::{self, error::TryRecvError};

/// Result of an operation that completes on a background worker.
///
/// Await it from async code, or call [`wait`](Self::wait) from a plain
/// thread. Failures of the operation arrive here, never as an error from the
/// call that started it. If the pool shuts down first the result is
/// [`CoreError::WorkerUnavailable`].
#[derive(Debug)]
#[must_use = "a pending operation does nothing unless awaited or waited on"]
pub struct PendingOp<T> {
    rx: oneshot::Receiver<CoreResult<T>>,
}

impl<T> PendingOp<T> {
    pub(crate) fn new(rx: oneshot::Receiver<CoreResult<T>>) -> Self {
        Self { rx }
    }

    /// An operation that has already finished with `result`.
    pub fn ready(result: CoreResult<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        // The receiver is alive, so the send cannot fail.
        let _ = tx.send(result);
        Self { rx }
    }

    /// Blocks the current thread until the operation finishes.
    ///
    /// Must not be called from inside an async runtime; await instead.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or [`CoreError::WorkerUnavailable`].
    pub fn wait(self) -> CoreResult<T> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(CoreError::WorkerUnavailable))
    }

    /// Takes the result if the operation has finished.
    pub fn try_result(&mut self) -> Option<CoreResult<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(CoreError::WorkerUnavailable)),
        }
    }
}

impl<T> Future for PendingOp<T> {
    type Output = CoreResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(CoreError::WorkerUnavailable)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_resolves_immediately() {
        assert_eq!(PendingOp::ready(Ok(7)).wait().unwrap(), 7);

        let mut op: PendingOp<()> = PendingOp::ready(Err(CoreError::NotReady));
        assert!(matches!(op.try_result(), Some(Err(CoreError::NotReady))));
    }

    #[test]
    fn dropped_sender_is_worker_unavailable() {
        let (tx, rx) = oneshot::channel::<CoreResult<u8>>();
        let mut op = PendingOp::new(rx);
        assert!(op.try_result().is_none());
        drop(tx);
        assert!(matches!(op.wait(), Err(CoreError::WorkerUnavailable)));
    }

    #[tokio::test]
    async fn awaitable() {
        let (tx, rx) = oneshot::channel();
        let op = PendingOp::new(rx);
        tx.send(Ok("done")).unwrap();
        assert_eq!(op.await.unwrap(), "done");
    }
}
