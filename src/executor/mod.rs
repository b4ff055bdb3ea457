//! Trigger lifecycle, job contract and the bounded worker pool.

mod engine;
mod error;
mod job;
mod pool;
mod trigger;

pub use engine::{CompletionCallback, Executor};
pub use error::{ExecutorError, JobFactoryError};
pub use job::{Job, JobContext, JobError, JobFactory, JobParams, JobRegistry};
pub use pool::{TaskHandle, WorkerPool};
pub use trigger::{Trigger, TriggerInfo, TriggerOutcome, TriggerRequest, TriggerState};
