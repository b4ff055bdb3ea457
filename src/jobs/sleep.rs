use crate::executor::{Job, JobContext, JobError, JobParams};
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Sleeps for `seconds` (default 1), stopping early when interrupted.
#[derive(Default)]
pub struct SleepJob {
    interrupted: AtomicBool,
}

impl SleepJob {
    pub const CLASS_NAME: &'static str = "builtin.Sleep";

    pub fn new() -> Self {
        Self::default()
    }

    fn requested_duration(params: &JobParams) -> Result<Duration, JobError> {
        match params.get("seconds") {
            None => Ok(Duration::from_secs(1)),
            Some(value) => value
                .as_f64()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64)
                .ok_or_else(|| {
                    JobError::InvalidParams(format!(
                        "seconds must be a non-negative number, got {}",
                        value
                    ))
                }),
        }
    }
}

impl Job for SleepJob {
    fn run(&self, ctx: &JobContext, params: &JobParams) -> Result<JsonValue, JobError> {
        let duration = Self::requested_duration(params)?;
        let deadline = Instant::now() + duration;

        loop {
            if ctx.is_cancelled() || self.interrupted.load(Ordering::SeqCst) {
                debug!("Sleep job for trigger {} interrupted", ctx.trigger_id);
                return Err(JobError::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }

        Ok(json!({ "slept": duration.as_secs_f64() }))
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}
