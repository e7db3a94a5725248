use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

/// The set of step-enrichment tasks still running for a session.
///
/// Tasks leave the set on their own when they finish, whatever the outcome.
/// `drain_all` is how a stopping session waits for them.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    tracker: TaskTracker,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait until every tracked task has settled, including tasks tracked
    /// while the drain is in progress. Failures and panics are ignored.
    pub async fn drain_all(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
