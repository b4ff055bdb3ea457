use super::error::JobFactoryError;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Parameters handed to a job body.
pub type JobParams = serde_json::Map<String, JsonValue>;

/// Errors a job body can finish with.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JobError {
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Job was interrupted")]
    Interrupted,

    #[error("Job panicked: {0}")]
    Panicked(String),
}

/// Context provided to a job while it runs.
#[derive(Clone)]
pub struct JobContext {
    pub trigger_id: String,
    pub job_id: String,

    /// Cancelled by the executor when the trigger is interrupted.
    pub cancellation_token: CancellationToken,
}

impl JobContext {
    pub fn new(
        trigger_id: impl Into<String>,
        job_id: impl Into<String>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            trigger_id: trigger_id.into(),
            job_id: job_id.into(),
            cancellation_token,
        }
    }

    /// Check if an interrupt has been requested.
    ///
    /// Long-running jobs should poll this and return
    /// `JobError::Interrupted` once it turns true.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

/// A unit of work run by the executor.
///
/// `run` is called from a blocking context using `spawn_blocking`, so it may
/// block freely but must not assume a Tokio context for async calls.
pub trait Job: Send + Sync {
    fn run(&self, ctx: &JobContext, params: &JobParams) -> Result<JsonValue, JobError>;

    /// Request that an in-flight `run` stops early.
    ///
    /// May be called from any thread, possibly before `run` starts or after it
    /// returned, and possibly more than once. The cancellation token in the
    /// [`JobContext`] is already cancelled when this is called.
    fn interrupt(&self) {}
}

/// Creates job instances by class name.
pub trait JobFactory: Send + Sync {
    fn create(&self, class_name: &str) -> Result<Arc<dyn Job>, JobFactoryError>;
}

type JobConstructor = Box<dyn Fn() -> Arc<dyn Job> + Send + Sync>;

/// [`JobFactory`] backed by a map from class name to constructor.
#[derive(Default)]
pub struct JobRegistry {
    constructors: HashMap<String, JobConstructor>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `constructor` under `class_name`, replacing any previous entry.
    pub fn register<F>(&mut self, class_name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Job> + Send + Sync + 'static,
    {
        self.constructors
            .insert(class_name.into(), Box::new(constructor));
        self
    }

    /// Registered class names, sorted.
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl JobFactory for JobRegistry {
    fn create(&self, class_name: &str) -> Result<Arc<dyn Job>, JobFactoryError> {
        self.constructors
            .get(class_name)
            .map(|constructor| constructor())
            .ok_or_else(|| JobFactoryError::UnknownClass(class_name.to_string()))
    }
}
