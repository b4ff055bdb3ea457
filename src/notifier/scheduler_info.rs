use super::models::SchedulerInfoPayload;
use chrono::{DateTime, Utc};
use std::sync::{PoisonError, RwLock};

/// Where completion results are delivered to.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerInfo {
    pub address: Option<String>,
    pub epoch: i64,
    pub time_updated: DateTime<Utc>,
}

impl SchedulerInfo {
    /// Wire form, or `None` while no address is known.
    pub fn payload(&self) -> Option<SchedulerInfoPayload> {
        self.address.as_ref().map(|address| SchedulerInfoPayload {
            address: address.clone(),
            epoch: self.epoch,
            time_updated: self.time_updated,
        })
    }
}

/// Shared, atomically replaced scheduler metadata.
///
/// Readers always see a complete snapshot, never a mix of two updates.
#[derive(Debug)]
pub struct SchedulerInfoCell {
    inner: RwLock<SchedulerInfo>,
}

impl SchedulerInfoCell {
    pub fn new(address: Option<String>, epoch: i64) -> Self {
        Self {
            inner: RwLock::new(SchedulerInfo {
                address,
                epoch,
                time_updated: Utc::now(),
            }),
        }
    }

    pub fn snapshot(&self) -> SchedulerInfo {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, address: Option<String>, epoch: i64) -> SchedulerInfo {
        let mut info = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *info = SchedulerInfo {
            address,
            epoch,
            time_updated: Utc::now(),
        };
        info.clone()
    }
}

impl Default for SchedulerInfoCell {
    fn default() -> Self {
        Self::new(None, 0)
    }
}
