use crate::executor::{CompletionCallback, Executor, Trigger};
use crate::notifier::{Notifier, SchedulerInfoCell};
use std::sync::Arc;
use std::time::Instant;

pub type GuardedNotifier = Arc<Notifier>;
pub type GuardedSchedulerInfo = Arc<SchedulerInfoCell>;

#[derive(Clone)]
pub struct ServerState {
    pub start_time: Instant,
    pub executor: Executor,
    pub notifier: GuardedNotifier,
    pub scheduler_info: GuardedSchedulerInfo,
}

impl ServerState {
    pub fn new(executor: Executor, notifier: GuardedNotifier) -> Self {
        let scheduler_info = Arc::clone(notifier.scheduler_info());
        Self {
            start_time: Instant::now(),
            executor,
            notifier,
            scheduler_info,
        }
    }

    /// Callback reporting every finished trigger through the notifier.
    pub fn completion_callback(&self) -> CompletionCallback {
        let notifier = Arc::clone(&self.notifier);
        Arc::new(move |trigger: &Trigger| -> anyhow::Result<()> {
            notifier.notify(trigger)?;
            Ok(())
        })
    }
}
