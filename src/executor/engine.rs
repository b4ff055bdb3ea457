use super::error::ExecutorError;
use super::job::{JobError, JobFactory};
use super::pool::{TaskHandle, WorkerPool};
use super::trigger::{Trigger, TriggerOutcome, TriggerRequest, TriggerState};
use crate::server::metrics;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Invoked once when a trigger reaches a terminal state.
pub type CompletionCallback = Arc<dyn Fn(&Trigger) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutorStatus {
    Running,
    ShutDown,
}

impl std::fmt::Display for ExecutorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorStatus::Running => write!(f, "RUNNING"),
            ExecutorStatus::ShutDown => write!(f, "SHUT_DOWN"),
        }
    }
}

struct LiveEntry {
    trigger: Trigger,
    task: TaskHandle,
    callback: Option<CompletionCallback>,
}

struct ExecutorState {
    status: ExecutorStatus,
    live: HashMap<String, LiveEntry>,
}

impl ExecutorState {
    fn ensure_accepting(&self, trigger_id: &str) -> Result<(), ExecutorError> {
        if self.status != ExecutorStatus::Running {
            return Err(ExecutorError::illegal_state(
                ExecutorStatus::Running,
                self.status,
            ));
        }
        if self.live.contains_key(trigger_id) {
            return Err(ExecutorError::DuplicateTrigger(trigger_id.to_string()));
        }
        Ok(())
    }
}

struct Shared {
    state: Mutex<ExecutorState>,
    factory: Arc<dyn JobFactory>,
    pool: WorkerPool,
}

/// What `interrupt` has to do once the state lock is released.
enum InterruptAction {
    Nothing,
    Cancelled(Option<CompletionCallback>),
    InterruptJob,
}

/// Runs triggers on a bounded worker pool and tracks them until they finish.
///
/// Every state change of a live trigger happens under a single lock. Job
/// bodies, `Job::interrupt` and completion callbacks always run with that
/// lock released.
#[derive(Clone)]
pub struct Executor {
    shared: Arc<Shared>,
}

impl Executor {
    /// Creates an executor running at most `workers` job bodies at once.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(factory: Arc<dyn JobFactory>, workers: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ExecutorState {
                    status: ExecutorStatus::Running,
                    live: HashMap::new(),
                }),
                factory,
                pool: WorkerPool::new(workers),
            }),
        }
    }

    pub fn workers(&self) -> usize {
        self.shared.pool.size()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.lock_state().status == ExecutorStatus::ShutDown
    }

    /// Accepts a trigger and submits it to the worker pool.
    ///
    /// Returns as soon as the trigger is live. `callback` is invoked once the
    /// trigger reaches `Done` or `Interrupted`.
    pub fn trigger(
        &self,
        request: TriggerRequest,
        callback: Option<CompletionCallback>,
    ) -> Result<Trigger, ExecutorError> {
        self.shared
            .lock_state()
            .ensure_accepting(&request.trigger_id)?;

        let job = self.shared.factory.create(&request.class_name)?;
        let trigger = Trigger::new(request, job);
        let trigger_id = trigger.trigger_id().to_string();

        let mut state = self.shared.lock_state();
        // Re-check, the lock was released while the factory ran
        state.ensure_accepting(&trigger_id)?;

        let shared = Arc::clone(&self.shared);
        let run_trigger = trigger.clone();
        let task = self
            .shared
            .pool
            .submit(move || shared.run(run_trigger))
            .ok_or_else(|| ExecutorError::illegal_state("open worker pool", "closed"))?;

        state.live.insert(
            trigger_id,
            LiveEntry {
                trigger: trigger.clone(),
                task,
                callback,
            },
        );
        metrics::set_live_triggers(state.live.len());
        drop(state);

        info!(
            "Accepted trigger {} (job {}, class {})",
            trigger.trigger_id(),
            trigger.job_id(),
            trigger.class_name()
        );
        Ok(trigger)
    }

    /// Requests that the live trigger `trigger_id` stops.
    ///
    /// Fails with `TriggerNotFound` when no such trigger is live. See
    /// [`Executor::interrupt_trigger`] for what happens to a live one.
    pub fn interrupt(&self, trigger_id: &str) -> Result<Trigger, ExecutorError> {
        let trigger = self.get_trigger(trigger_id)?;
        self.interrupt_trigger(&trigger)?;
        Ok(trigger)
    }

    /// Requests that `trigger` stops.
    ///
    /// A trigger whose body has not started is cancelled outright and ends in
    /// `Interrupted` without an outcome. A running one moves to
    /// `Interrupting` and its job is asked to stop. Interrupting a trigger
    /// that is already interrupting or finished has no effect.
    pub fn interrupt_trigger(&self, trigger: &Trigger) -> Result<(), ExecutorError> {
        let trigger_id = trigger.trigger_id();
        let action = {
            let mut state = self.shared.lock_state();
            // A finished trigger is no longer in the table, and its id may
            // already belong to a newer trigger
            let entry = match state.live.get(trigger_id) {
                Some(entry) if entry.trigger.same_as(trigger) => entry,
                _ => {
                    debug!(
                        "Interrupt of trigger {} ignored in state {}",
                        trigger_id,
                        trigger.state()
                    );
                    return Ok(());
                }
            };

            match trigger.state() {
                TriggerState::Init if entry.task.cancel() => {
                    trigger.mark_cancelled()?;
                    let callback = state
                        .live
                        .remove(trigger_id)
                        .and_then(|entry| entry.callback);
                    metrics::set_live_triggers(state.live.len());
                    InterruptAction::Cancelled(callback)
                }
                TriggerState::Init | TriggerState::Running => {
                    trigger.mark_interrupting()?;
                    InterruptAction::InterruptJob
                }
                TriggerState::Interrupting | TriggerState::Interrupted | TriggerState::Done => {
                    InterruptAction::Nothing
                }
            }
        };

        match action {
            InterruptAction::Nothing => {
                debug!(
                    "Interrupt of trigger {} ignored in state {}",
                    trigger_id,
                    trigger.state()
                );
            }
            InterruptAction::Cancelled(callback) => {
                info!("Trigger {} cancelled before its job started", trigger_id);
                metrics::record_trigger_finished("interrupted", None);
                invoke_callback(trigger, callback);
            }
            InterruptAction::InterruptJob => {
                info!("Interrupting trigger {}", trigger_id);
                trigger.cancellation_token().cancel();
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| trigger.job().interrupt())) {
                    error!(
                        "Job interrupt for trigger {} panicked: {}",
                        trigger_id,
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        Ok(())
    }

    /// Snapshot of every live trigger.
    pub fn triggers(&self) -> Vec<Trigger> {
        self.shared
            .lock_state()
            .live
            .values()
            .map(|entry| entry.trigger.clone())
            .collect()
    }

    pub fn get_trigger(&self, trigger_id: &str) -> Result<Trigger, ExecutorError> {
        self.shared
            .lock_state()
            .live
            .get(trigger_id)
            .map(|entry| entry.trigger.clone())
            .ok_or_else(|| ExecutorError::TriggerNotFound(trigger_id.to_string()))
    }

    /// Stops accepting triggers, interrupts the live ones and waits for the
    /// worker pool to drain.
    ///
    /// Waits forever when `timeout` is `None`. On timeout the remaining work
    /// keeps running. Calling this again after the first call is a no-op.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> Result<(), ExecutorError> {
        let live: Vec<Trigger> = {
            let mut state = self.shared.lock_state();
            if state.status == ExecutorStatus::ShutDown {
                debug!("Executor already shut down");
                return Ok(());
            }
            state.status = ExecutorStatus::ShutDown;
            state.live.values().map(|entry| entry.trigger.clone()).collect()
        };

        info!(
            "Shutting down executor, interrupting {} live trigger(s)",
            live.len()
        );
        for trigger in &live {
            if let Err(e) = self.interrupt_trigger(trigger) {
                warn!("Failed to interrupt trigger {}: {}", trigger.trigger_id(), e);
            }
        }

        self.shared.pool.close();
        match timeout {
            Some(timeout) => {
                if tokio::time::timeout(timeout, self.shared.pool.wait())
                    .await
                    .is_err()
                {
                    warn!(
                        "Executor shutdown timed out after {:?}, {} task(s) still running",
                        timeout,
                        self.shared.pool.outstanding()
                    );
                    return Err(ExecutorError::ShutdownTimeout(timeout));
                }
            }
            None => self.shared.pool.wait().await,
        }

        info!("Executor shut down");
        Ok(())
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ExecutorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Body submitted to the worker pool for every trigger.
    fn run(&self, trigger: Trigger) {
        let trigger_id = trigger.trigger_id().to_string();

        let started = {
            let _state = self.lock_state();
            trigger.mark_running()
        };
        if let Err(e) = started {
            error!("Trigger {} could not start: {}", trigger_id, e);
            return;
        }
        debug!("Trigger {} started", trigger_id);

        let ctx = trigger.job_context();
        let outcome = match catch_unwind(AssertUnwindSafe(|| {
            trigger.job().run(&ctx, trigger.params())
        })) {
            Ok(Ok(value)) => TriggerOutcome::Result(value),
            Ok(Err(err)) => TriggerOutcome::Error(err),
            Err(panic) => TriggerOutcome::Error(JobError::Panicked(panic_message(panic.as_ref()))),
        };

        let (final_state, callback) = {
            let mut state = self.lock_state();
            let final_state = match trigger.complete(outcome) {
                Ok(final_state) => final_state,
                Err(e) => {
                    error!("Trigger {} could not complete: {}", trigger_id, e);
                    return;
                }
            };
            let callback = state
                .live
                .remove(&trigger_id)
                .and_then(|entry| entry.callback);
            metrics::set_live_triggers(state.live.len());
            (final_state, callback)
        };

        let outcome_label = match (final_state, trigger.error()) {
            (TriggerState::Interrupted, _) => "interrupted",
            (_, Some(_)) => "failed",
            _ => "success",
        };
        metrics::record_trigger_finished(outcome_label, trigger.run_duration());

        match trigger.error() {
            Some(err) => warn!(
                "Trigger {} finished as {} after {:?}: {}",
                trigger_id,
                final_state,
                trigger.run_duration().unwrap_or_default(),
                err
            ),
            None => info!(
                "Trigger {} finished as {} after {:?}",
                trigger_id,
                final_state,
                trigger.run_duration().unwrap_or_default()
            ),
        }

        invoke_callback(&trigger, callback);
    }
}

fn invoke_callback(trigger: &Trigger, callback: Option<CompletionCallback>) {
    let Some(callback) = callback else {
        return;
    };
    match catch_unwind(AssertUnwindSafe(|| callback(trigger))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(
            "Completion callback for trigger {} failed: {:#}",
            trigger.trigger_id(),
            e
        ),
        Err(panic) => error!(
            "Completion callback for trigger {} panicked: {}",
            trigger.trigger_id(),
            panic_message(panic.as_ref())
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
