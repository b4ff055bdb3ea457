use std::time::Duration;
use thiserror::Error;

/// Errors returned by a [`JobFactory`](super::JobFactory).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JobFactoryError {
    #[error("Unknown job class: {0}")]
    UnknownClass(String),

    #[error("Failed to instantiate job {class_name}: {reason}")]
    Instantiation { class_name: String, reason: String },
}

/// Errors returned synchronously by the [`Executor`](super::Executor).
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Illegal state: expected {expected}, found {actual}")]
    IllegalState { expected: String, actual: String },

    #[error("Trigger already live: {0}")]
    DuplicateTrigger(String),

    #[error("Trigger not found: {0}")]
    TriggerNotFound(String),

    #[error("Job factory error: {0}")]
    JobFactory(#[from] JobFactoryError),

    #[error("Outstanding work did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

impl ExecutorError {
    pub(crate) fn illegal_state(expected: impl ToString, actual: impl ToString) -> Self {
        ExecutorError::IllegalState {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
