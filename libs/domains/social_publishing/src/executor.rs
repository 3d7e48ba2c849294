//! Background execution of publish attempts.
//!
//! Tasks are best-effort: not durable, not retried, lost on process exit.
//! A task starts only once the catalog write that triggered it has committed.

use std::future::Future;
use std::pin::Pin;
use tokio::sync::oneshot;
use tracing::debug;

/// A detached unit of publishing work
pub type PublishTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs publish tasks off the request path.
pub trait TaskExecutor: Send + Sync {
    fn spawn(&self, task: PublishTask);
}

/// One detached tokio task per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl TaskExecutor for TokioExecutor {
    fn spawn(&self, task: PublishTask) {
        tokio::spawn(task);
    }
}

/// "Run after commit" hook handed to the dispatcher with each event.
#[derive(Debug)]
pub struct CommitGate {
    rx: Option<oneshot::Receiver<bool>>,
}

/// Held by the catalog layer until its transaction settles.
///
/// Dropping the handle without calling [`CommitHandle::commit`] counts as a
/// rollback.
#[derive(Debug)]
pub struct CommitHandle {
    tx: oneshot::Sender<bool>,
}

impl CommitGate {
    /// The triggering write is already durable.
    pub fn committed() -> Self {
        Self { rx: None }
    }

    /// Gate that opens when the returned handle commits.
    pub fn pending() -> (CommitHandle, Self) {
        let (tx, rx) = oneshot::channel();
        (CommitHandle { tx }, Self { rx: Some(rx) })
    }

    /// Wait for the outcome. `true` when committed.
    pub async fn wait(self) -> bool {
        match self.rx {
            None => true,
            Some(rx) => rx.await.unwrap_or_else(|_| {
                debug!("Commit handle dropped without committing");
                false
            }),
        }
    }
}

impl CommitHandle {
    pub fn commit(self) {
        let _ = self.tx.send(true);
    }

    pub fn rollback(self) {
        let _ = self.tx.send(false);
    }
}
