use super::error::ExecutorError;
use super::job::{Job, JobContext, JobError, JobParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerState {
    Init,
    Running,
    Interrupting,
    Interrupted,
    Done,
}

impl TriggerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TriggerState::Done | TriggerState::Interrupted)
    }
}

impl std::fmt::Display for TriggerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerState::Init => write!(f, "INIT"),
            TriggerState::Running => write!(f, "RUNNING"),
            TriggerState::Interrupting => write!(f, "INTERRUPTING"),
            TriggerState::Interrupted => write!(f, "INTERRUPTED"),
            TriggerState::Done => write!(f, "DONE"),
        }
    }
}

/// What a job body finished with.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Result(JsonValue),
    Error(JobError),
}

/// Request to run a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub trigger_id: String,
    pub job_id: String,
    pub name: String,
    pub class_name: String,
    #[serde(default)]
    pub params: JobParams,
}

/// Serializable snapshot of a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerInfo {
    pub trigger_id: String,
    pub job_id: String,
    pub name: String,
    pub class_name: String,
    pub params: JobParams,
    pub state: TriggerState,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    pub time_created: DateTime<Utc>,
    pub time_completed: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct TriggerStatus {
    state: TriggerState,
    outcome: Option<TriggerOutcome>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    time_completed: Option<DateTime<Utc>>,
}

struct TriggerInner {
    trigger_id: String,
    job_id: String,
    name: String,
    class_name: String,
    params: JobParams,
    time_created: DateTime<Utc>,
    job: Arc<dyn Job>,
    cancellation_token: CancellationToken,
    status: Mutex<TriggerStatus>,
}

/// One invocation of a job.
///
/// Cloning is cheap and every clone observes the same state. State changes are
/// made only by the executor. Once a trigger reaches a terminal state it never
/// changes again.
#[derive(Clone)]
pub struct Trigger {
    inner: Arc<TriggerInner>,
}

impl Trigger {
    pub(crate) fn new(request: TriggerRequest, job: Arc<dyn Job>) -> Self {
        Self {
            inner: Arc::new(TriggerInner {
                trigger_id: request.trigger_id,
                job_id: request.job_id,
                name: request.name,
                class_name: request.class_name,
                params: request.params,
                time_created: Utc::now(),
                job,
                cancellation_token: CancellationToken::new(),
                status: Mutex::new(TriggerStatus {
                    state: TriggerState::Init,
                    outcome: None,
                    started_at: None,
                    finished_at: None,
                    time_completed: None,
                }),
            }),
        }
    }

    pub fn trigger_id(&self) -> &str {
        &self.inner.trigger_id
    }

    pub fn job_id(&self) -> &str {
        &self.inner.job_id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn class_name(&self) -> &str {
        &self.inner.class_name
    }

    pub fn params(&self) -> &JobParams {
        &self.inner.params
    }

    pub fn time_created(&self) -> DateTime<Utc> {
        self.inner.time_created
    }

    pub fn job(&self) -> &Arc<dyn Job> {
        &self.inner.job
    }

    pub fn state(&self) -> TriggerState {
        self.lock_status().state
    }

    pub fn outcome(&self) -> Option<TriggerOutcome> {
        self.lock_status().outcome.clone()
    }

    pub fn result(&self) -> Option<JsonValue> {
        match self.lock_status().outcome {
            Some(TriggerOutcome::Result(ref value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<JobError> {
        match self.lock_status().outcome {
            Some(TriggerOutcome::Error(ref err)) => Some(err.clone()),
            _ => None,
        }
    }

    pub fn time_completed(&self) -> Option<DateTime<Utc>> {
        self.lock_status().time_completed
    }

    /// Time spent between the body starting and the trigger completing.
    pub fn run_duration(&self) -> Option<Duration> {
        let status = self.lock_status();
        let started = status.started_at?;
        status
            .finished_at
            .map(|finished| finished.saturating_duration_since(started))
    }

    pub fn info(&self) -> TriggerInfo {
        let status = self.lock_status();
        let (result, error) = match &status.outcome {
            Some(TriggerOutcome::Result(value)) => (Some(value.clone()), None),
            Some(TriggerOutcome::Error(err)) => (None, Some(err.to_string())),
            None => (None, None),
        };
        TriggerInfo {
            trigger_id: self.inner.trigger_id.clone(),
            job_id: self.inner.job_id.clone(),
            name: self.inner.name.clone(),
            class_name: self.inner.class_name.clone(),
            params: self.inner.params.clone(),
            state: status.state,
            result,
            error,
            time_created: self.inner.time_created,
            time_completed: status.time_completed,
        }
    }

    pub(crate) fn job_context(&self) -> JobContext {
        JobContext::new(
            self.inner.trigger_id.clone(),
            self.inner.job_id.clone(),
            self.inner.cancellation_token.clone(),
        )
    }

    pub(crate) fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancellation_token
    }

    fn lock_status(&self) -> MutexGuard<'_, TriggerStatus> {
        self.inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// `Init -> Running`. A trigger already `Interrupting` stays there and
    /// its body still runs.
    pub(crate) fn mark_running(&self) -> Result<TriggerState, ExecutorError> {
        let mut status = self.lock_status();
        match status.state {
            TriggerState::Init => status.state = TriggerState::Running,
            TriggerState::Interrupting => {}
            other => return Err(ExecutorError::illegal_state("INIT or INTERRUPTING", other)),
        }
        status.started_at = Some(Instant::now());
        Ok(status.state)
    }

    /// `Running -> Done` or `Interrupting -> Interrupted`, recording the outcome.
    pub(crate) fn complete(&self, outcome: TriggerOutcome) -> Result<TriggerState, ExecutorError> {
        let mut status = self.lock_status();
        status.state = match status.state {
            TriggerState::Running => TriggerState::Done,
            TriggerState::Interrupting => TriggerState::Interrupted,
            other => return Err(ExecutorError::illegal_state("RUNNING or INTERRUPTING", other)),
        };
        status.outcome = Some(outcome);
        status.finished_at = Some(Instant::now());
        status.time_completed = Some(Utc::now());
        Ok(status.state)
    }

    /// Whether both handles refer to the same trigger.
    pub(crate) fn same_as(&self, other: &Trigger) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// `Init | Running -> Interrupting`.
    pub(crate) fn mark_interrupting(&self) -> Result<(), ExecutorError> {
        let mut status = self.lock_status();
        match status.state {
            TriggerState::Init | TriggerState::Running => {
                status.state = TriggerState::Interrupting;
                Ok(())
            }
            other => Err(ExecutorError::illegal_state("INIT or RUNNING", other)),
        }
    }

    /// `Init -> Interrupted` for a trigger whose body never started. No
    /// outcome is recorded, only the completion time.
    pub(crate) fn mark_cancelled(&self) -> Result<(), ExecutorError> {
        let mut status = self.lock_status();
        match status.state {
            TriggerState::Init => {
                status.state = TriggerState::Interrupted;
                status.time_completed = Some(Utc::now());
                Ok(())
            }
            other => Err(ExecutorError::illegal_state(TriggerState::Init, other)),
        }
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("trigger_id", &self.inner.trigger_id)
            .field("class_name", &self.inner.class_name)
            .field("state", &self.state())
            .finish()
    }
}
