//! Single-loop delayed execution with pluggable retry.

mod retry_strategy;
mod scheduler;

pub use retry_strategy::{ExponentialBackoffWithJitter, NoRetry, RetryState, RetryStrategy};
pub use scheduler::{Timer, TimerLoopState, DEFAULT_IDLE_WAIT};
