//! Trigger Executor Library
//!
//! Runs jobs on request, tracks every invocation through its lifecycle and
//! reports finished invocations back to the remote scheduler.

pub mod config;
pub mod executor;
pub mod jobs;
pub mod notifier;
pub mod server;
pub mod timer;

// Re-export commonly used types for convenience
pub use executor::{Executor, ExecutorError, Job, JobFactory, JobRegistry, Trigger, TriggerState};
pub use notifier::{Notifier, SchedulerInfoCell};
pub use server::{make_app, run_server, ServerState};
pub use timer::{ExponentialBackoffWithJitter, NoRetry, RetryStrategy, Timer};
