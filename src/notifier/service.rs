use super::models::ExecuteResultRequest;
use super::scheduler_info::SchedulerInfoCell;
use super::transport::{DeliveryError, NotifyTransport};
use crate::executor::Trigger;
use crate::server::metrics;
use crate::timer::{RetryStrategy, Timer, TimerLoopState};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierState {
    Init,
    Started,
    Shutdown,
}

impl std::fmt::Display for NotifierState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifierState::Init => write!(f, "INIT"),
            NotifierState::Started => write!(f, "STARTED"),
            NotifierState::Shutdown => write!(f, "SHUTDOWN"),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Illegal notifier state: expected {expected}, found {actual}")]
    IllegalState {
        expected: NotifierState,
        actual: NotifierState,
    },

    #[error("Pending notifications not delivered within {0:?}")]
    Timeout(Duration),

    #[error("Delivery loop terminated before flushing pending notifications")]
    DeliveryLoopFailed,
}

/// Reports finished triggers to the scheduler.
///
/// Every notification becomes a timer item that posts the result and is
/// retried by the timer's strategy until the scheduler accepts it or the
/// strategy gives up.
pub struct Notifier {
    state: Mutex<NotifierState>,
    timer: Timer,
    transport: Arc<dyn NotifyTransport>,
    scheduler_info: Arc<SchedulerInfoCell>,
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn NotifyTransport>,
        scheduler_info: Arc<SchedulerInfoCell>,
        strategy: Arc<dyn RetryStrategy>,
    ) -> Self {
        Self::with_timer(transport, scheduler_info, Timer::new(strategy))
    }

    pub fn with_timer(
        transport: Arc<dyn NotifyTransport>,
        scheduler_info: Arc<SchedulerInfoCell>,
        timer: Timer,
    ) -> Self {
        Self {
            state: Mutex::new(NotifierState::Init),
            timer,
            transport,
            scheduler_info,
        }
    }

    pub fn state(&self) -> NotifierState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn scheduler_info(&self) -> &Arc<SchedulerInfoCell> {
        &self.scheduler_info
    }

    /// Notifications scheduled and not yet delivered or dropped.
    pub fn pending(&self) -> usize {
        self.timer.pending()
    }

    fn transition(&self, from: NotifierState, to: NotifierState) -> Result<(), NotifierError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != from {
            return Err(NotifierError::IllegalState {
                expected: from,
                actual: *state,
            });
        }
        *state = to;
        Ok(())
    }

    /// Starts the delivery loop. Must be called within a Tokio runtime.
    pub fn start(&self) -> Result<(), NotifierError> {
        self.transition(NotifierState::Init, NotifierState::Started)?;
        self.timer.start();
        info!("Notifier started");
        Ok(())
    }

    /// Schedules delivery of `trigger`'s result. Never waits for the network.
    pub fn notify(&self, trigger: &Trigger) -> Result<(), NotifierError> {
        let actual = self.state();
        if actual != NotifierState::Started {
            return Err(NotifierError::IllegalState {
                expected: NotifierState::Started,
                actual,
            });
        }

        let transport = Arc::clone(&self.transport);
        let scheduler_info = Arc::clone(&self.scheduler_info);
        let trigger = trigger.clone();
        let label = format!("notify:{}", trigger.trigger_id());

        let scheduled = self.timer.schedule(Duration::ZERO, label, move || {
            let transport = Arc::clone(&transport);
            let scheduler_info = Arc::clone(&scheduler_info);
            let trigger = trigger.clone();
            async move { deliver(transport.as_ref(), &scheduler_info, &trigger).await }
        });
        if !scheduled {
            warn!("Notification dropped, delivery loop is shutting down");
        }
        Ok(())
    }

    /// Stops accepting notifications and flushes the pending ones, each
    /// attempted once more regardless of its retry delay.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> Result<(), NotifierError> {
        self.transition(NotifierState::Started, NotifierState::Shutdown)?;
        info!("Shutting down notifier, {} pending", self.timer.pending());

        if !self.timer.shutdown(timeout).await {
            return match (self.timer.loop_state(), timeout) {
                (TimerLoopState::Failed, _) | (_, None) => {
                    Err(NotifierError::DeliveryLoopFailed)
                }
                (_, Some(timeout)) => Err(NotifierError::Timeout(timeout)),
            };
        }
        info!("Notifier shut down");
        Ok(())
    }
}

/// One delivery attempt.
async fn deliver(
    transport: &dyn NotifyTransport,
    scheduler_info: &SchedulerInfoCell,
    trigger: &Trigger,
) -> anyhow::Result<()> {
    match attempt(transport, scheduler_info, trigger).await {
        Ok(()) => {
            metrics::record_notify_attempt("delivered");
            debug!("Delivered result of trigger {}", trigger.trigger_id());
            Ok(())
        }
        Err(e) => {
            metrics::record_notify_attempt("failed");
            Err(anyhow::Error::new(e).context(format!(
                "delivering result of trigger {}",
                trigger.trigger_id()
            )))
        }
    }
}

async fn attempt(
    transport: &dyn NotifyTransport,
    scheduler_info: &SchedulerInfoCell,
    trigger: &Trigger,
) -> Result<(), DeliveryError> {
    // One snapshot per attempt so a concurrent update is never half-applied
    let payload = scheduler_info
        .snapshot()
        .payload()
        .ok_or(DeliveryError::NoSchedulerAddress)?;
    let address = payload.address.clone();
    let request = ExecuteResultRequest::new(payload, trigger);

    let response = transport.send(&address, &request).await?;
    if !response.is_accepted() {
        return Err(DeliveryError::Rejected {
            code: response.status.code,
            detail: response.status.detail,
        });
    }
    Ok(())
}
