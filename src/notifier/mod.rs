//! Reliable reporting of finished triggers to the remote scheduler.

pub mod models;
mod scheduler_info;
mod service;
mod transport;

pub use scheduler_info::{SchedulerInfo, SchedulerInfoCell};
pub use service::{Notifier, NotifierError, NotifierState};
pub use transport::{DeliveryError, HttpNotifyTransport, NotifyTransport};
