//! Bounded worker pool for synchronous job bodies.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

/// Handle to a submitted task.
///
/// Exactly one of "the body starts" and "the task is cancelled" wins.
#[derive(Clone)]
pub struct TaskHandle {
    claim: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl TaskHandle {
    fn new() -> Self {
        Self {
            claim: Arc::new(AtomicU8::new(PENDING)),
            cancel: CancellationToken::new(),
        }
    }

    /// Cancels the task if its body has not started yet.
    ///
    /// Returns true when the body is guaranteed never to run.
    pub fn cancel(&self) -> bool {
        let won = self
            .claim
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.cancel.cancel();
        }
        won
    }

    fn try_start(&self) -> bool {
        self.claim
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Runs at most `size` bodies at once on the blocking thread pool.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    runtime: Handle,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool bound to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            runtime: Handle::current(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Submits `body` for execution. Returns `None` once the pool is closed.
    pub fn submit<F>(&self, body: F) -> Option<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tracker.is_closed() {
            return None;
        }

        let handle = TaskHandle::new();
        let task = handle.clone();
        let permits = Arc::clone(&self.permits);

        self.tracker.spawn_on(
            async move {
                let permit = tokio::select! {
                    biased;
                    _ = task.cancel.cancelled() => {
                        debug!("Task cancelled while waiting for a worker");
                        return;
                    }
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                if !task.try_start() {
                    debug!("Task cancelled before its body started");
                    return;
                }

                if let Err(e) = tokio::task::spawn_blocking(body).await {
                    error!("Worker body terminated abnormally: {}", e);
                }
                drop(permit);
            },
            &self.runtime,
        );

        Some(handle)
    }

    /// Stops accepting submissions. Already submitted tasks keep running.
    pub fn close(&self) {
        self.tracker.close();
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Number of tasks submitted and not yet finished.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until the pool is closed and every task has finished.
    pub async fn wait(&self) {
        self.tracker.wait().await
    }
}
