//! Deferred work on the tokio runtime.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Posts one message to a queue after a delay.
///
/// Dropping or cancelling the task before the delay elapses guarantees
/// the message is never posted.
#[derive(Debug)]
pub struct DeferredTask {
    handle: JoinHandle<()>,
}

impl DeferredTask {
    /// Spawns a task on `runtime` that sleeps for `delay`, then sends
    /// `message` on `tx`. A closed queue is ignored.
    pub fn post_after<T>(
        runtime: &Handle,
        delay: Duration,
        tx: mpsc::UnboundedSender<T>,
        message: T,
    ) -> Self
    where
        T: Send + 'static,
    {
        Self {
            handle: runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(message);
            }),
        }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for DeferredTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
