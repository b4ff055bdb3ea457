use super::retry_strategy::{RetryState, RetryStrategy};
use crate::server::metrics;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Wait used when the queue is empty and nothing wakes the loop.
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_secs(60);

/// Lifecycle of the background loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerLoopState {
    NotStarted,
    Running,
    /// Stopped after flushing the queue.
    Drained,
    /// Terminated without finishing the drain.
    Failed,
}

impl TimerLoopState {
    fn is_stopped(&self) -> bool {
        matches!(self, TimerLoopState::Drained | TimerLoopState::Failed)
    }
}

type TimerTask = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct ScheduledItem {
    due: Instant,
    seq: u64,
    label: String,
    task: TimerTask,
    retry: RetryState,
}

impl PartialEq for ScheduledItem {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledItem {}

impl PartialOrd for ScheduledItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct TimerQueue {
    heap: BinaryHeap<Reverse<ScheduledItem>>,
    next_seq: u64,
    stopping: bool,
}

impl TimerQueue {
    /// Pushes an item with a fresh insertion sequence. Returns true when it
    /// became the earliest item in the queue.
    fn push(&mut self, mut item: ScheduledItem) -> bool {
        item.seq = self.next_seq;
        self.next_seq += 1;
        let seq = item.seq;
        self.heap.push(Reverse(item));
        metrics::set_timer_queue_depth(self.heap.len());
        self.heap.peek().map(|Reverse(head)| head.seq) == Some(seq)
    }

    /// Pops every item due at `now`, or every item when stopping, in heap order.
    fn pop_due(&mut self, now: Instant) -> Vec<ScheduledItem> {
        let mut batch = Vec::new();
        while let Some(Reverse(head)) = self.heap.peek() {
            if !self.stopping && head.due > now {
                break;
            }
            if let Some(Reverse(item)) = self.heap.pop() {
                batch.push(item);
            }
        }
        metrics::set_timer_queue_depth(self.heap.len());
        batch
    }

    fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.heap
            .peek()
            .map(|Reverse(head)| head.due.saturating_duration_since(now))
    }
}

struct TimerShared {
    queue: Mutex<TimerQueue>,
    wakeup: Notify,
    loop_state: watch::Sender<TimerLoopState>,
    strategy: Arc<dyn RetryStrategy>,
    idle_wait: Duration,
}

impl TimerShared {
    fn lock_queue(&self) -> MutexGuard<'_, TimerQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(self: Arc<Self>) {
        info!("Timer loop started");

        loop {
            let batch = self.lock_queue().pop_due(Instant::now());
            if !batch.is_empty() {
                debug!("Timer executing {} due item(s)", batch.len());
            }
            for item in batch {
                self.execute(item).await;
            }

            let wait = {
                let queue = self.lock_queue();
                if queue.stopping {
                    if queue.heap.is_empty() {
                        break;
                    }
                    Duration::ZERO
                } else {
                    queue
                        .time_until_next(Instant::now())
                        .unwrap_or(self.idle_wait)
                }
            };

            if wait.is_zero() {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.wakeup.notified() => {}
            }
        }

        info!("Timer loop stopped, queue drained");
        self.loop_state.send_replace(TimerLoopState::Drained);
    }

    async fn execute(&self, mut item: ScheduledItem) {
        let task = Arc::clone(&item.task);
        let result = AssertUnwindSafe(async move { task().await })
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("scheduled task panicked")));

        let err = match result {
            Ok(()) => {
                self.strategy.clear(&mut item.retry);
                debug!("Timer item '{}' completed", item.label);
                return;
            }
            Err(err) => err,
        };

        if self.lock_queue().stopping {
            warn!(
                "Timer item '{}' failed during drain, dropping: {:#}",
                item.label, err
            );
            return;
        }

        match self.strategy.next_interval(&mut item.retry) {
            Some(delay) => {
                warn!(
                    "Timer item '{}' failed (retry {}), retrying in {:?}: {:#}",
                    item.label, item.retry.retries, delay, err
                );
                item.due = Instant::now() + delay;
                let mut queue = self.lock_queue();
                if queue.stopping {
                    warn!(
                        "Timer item '{}' not rescheduled, timer is shutting down",
                        item.label
                    );
                    return;
                }
                queue.push(item);
            }
            None => {
                metrics::record_timer_item_exhausted();
                error!(
                    "Timer item '{}' exhausted its retries after {} attempt(s), dropping: {:#}",
                    item.label,
                    item.retry.retries + 1,
                    err
                );
            }
        }
    }
}

/// Marks the loop failed if it goes away without reaching the end of `run`.
struct LoopGuard(Arc<TimerShared>);

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.loop_state.send_if_modified(|state| {
            if *state == TimerLoopState::Running {
                error!("Timer loop terminated before draining its queue");
                *state = TimerLoopState::Failed;
                true
            } else {
                false
            }
        });
    }
}

/// Single-loop scheduler for delayed async callables.
///
/// All scheduled work runs serially on one background task, in due-time
/// order with FIFO tie-breaking. A callable that never completes stalls every
/// other item. Failed items are rescheduled according to the configured
/// [`RetryStrategy`]. Shutting down flushes the queue: every remaining item
/// runs once regardless of its due time.
pub struct Timer {
    shared: Arc<TimerShared>,
    started: AtomicBool,
}

impl Timer {
    pub fn new(strategy: Arc<dyn RetryStrategy>) -> Self {
        Self::with_idle_wait(strategy, DEFAULT_IDLE_WAIT)
    }

    pub fn with_idle_wait(strategy: Arc<dyn RetryStrategy>, idle_wait: Duration) -> Self {
        Self {
            shared: Arc::new(TimerShared {
                queue: Mutex::new(TimerQueue::default()),
                wakeup: Notify::new(),
                loop_state: watch::Sender::new(TimerLoopState::NotStarted),
                strategy,
                idle_wait,
            }),
            started: AtomicBool::new(false),
        }
    }

    /// Spawns the background loop. Must be called within a Tokio runtime.
    /// Calling it again while the loop exists has no effect.
    pub fn start(&self) {
        if self.started.swap(true, AtomicOrdering::AcqRel) {
            return;
        }
        self.shared.loop_state.send_replace(TimerLoopState::Running);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let _guard = LoopGuard(Arc::clone(&shared));
            shared.run().await
        });
    }

    /// Schedules `task` to run once `delay` has elapsed.
    ///
    /// Returns false, dropping the task, when the timer is shutting down.
    pub fn schedule<F, Fut>(&self, delay: Duration, label: impl Into<String>, task: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let label = label.into();
        let mut queue = self.shared.lock_queue();
        if queue.stopping {
            warn!("Timer is shutting down, dropping item '{}'", label);
            return false;
        }

        let item = ScheduledItem {
            due: Instant::now() + delay,
            seq: 0,
            label,
            task: Arc::new(move || task().boxed()),
            retry: RetryState::new(),
        };
        let is_earliest = queue.push(item);
        drop(queue);

        if is_earliest {
            self.shared.wakeup.notify_one();
        }
        true
    }

    /// Number of items waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.lock_queue().heap.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.lock_queue().stopping
    }

    pub fn loop_state(&self) -> TimerLoopState {
        *self.shared.loop_state.borrow()
    }

    /// Stops accepting work and runs every queued item.
    ///
    /// Waits at most `timeout` (forever when `None`) for the loop to drain and
    /// returns whether it did. On timeout the loop keeps draining in the
    /// background and a later call can wait again. Concurrent callers all
    /// wait for the same loop.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> bool {
        self.shared.lock_queue().stopping = true;
        // A loop is needed to flush the queue even if start() was never called
        self.start();
        self.shared.wakeup.notify_one();

        let mut loop_state = self.shared.loop_state.subscribe();
        let stopped = async move {
            match loop_state.wait_for(TimerLoopState::is_stopped).await {
                Ok(state) => *state,
                Err(_) => TimerLoopState::Failed,
            }
        };

        let final_state = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, stopped).await.ok(),
            None => Some(stopped.await),
        };

        match final_state {
            Some(TimerLoopState::Drained) => true,
            Some(_) => false,
            None => {
                warn!(
                    "Timer did not drain within {:?}, {} item(s) still pending",
                    timeout,
                    self.pending()
                );
                false
            }
        }
    }
}
