//! Jobs shipped with the service.

mod echo;
mod sleep;

pub use echo::EchoJob;
pub use sleep::SleepJob;

use crate::executor::JobRegistry;
use std::sync::Arc;

/// Registry with every built-in job class.
pub fn default_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry
        .register(EchoJob::CLASS_NAME, || Arc::new(EchoJob))
        .register(SleepJob::CLASS_NAME, || Arc::new(SleepJob::new()));
    registry
}
