mod file_config;

pub use file_config::{FileConfig, NotifierConfig, SchedulerConfig};

use crate::timer::{ExponentialBackoffWithJitter, NoRetry, RetryStrategy};
use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for retry intervals, so that due times stay representable.
pub const MAX_RETRY_INTERVAL_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub port: u16,
    pub workers: usize,
    pub shutdown_timeout_secs: u64,
    pub scheduler_address: Option<String>,
    pub scheduler_epoch: i64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub workers: usize,
    pub shutdown_timeout_secs: u64,

    pub scheduler: SchedulerSettings,
    pub notifier: NotifierSettings,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerSettings {
    pub address: Option<String>,
    pub epoch: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotifierSettings {
    pub retry_enabled: bool,
    pub init_interval_secs: f64,
    pub max_interval_secs: f64,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub idle_wait_secs: u64,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            retry_enabled: true,
            init_interval_secs: 1.0,
            max_interval_secs: 300.0,
            max_retries: 10,
            request_timeout_secs: 10,
            idle_wait_secs: 60,
        }
    }
}

impl NotifierSettings {
    pub fn retry_strategy(&self) -> Arc<dyn RetryStrategy> {
        if !self.retry_enabled {
            return Arc::new(NoRetry);
        }
        Arc::new(ExponentialBackoffWithJitter::new(
            Duration::from_secs_f64(self.init_interval_secs),
            Duration::from_secs_f64(self.max_interval_secs),
            self.max_retries,
        ))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_secs(self.idle_wait_secs)
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let port = file.port.unwrap_or(cli.port);
        let workers = file.workers.unwrap_or(cli.workers);
        let shutdown_timeout_secs = file
            .shutdown_timeout_secs
            .unwrap_or(cli.shutdown_timeout_secs);

        if workers == 0 {
            bail!("workers must be at least 1");
        }

        let scheduler_file = file.scheduler.unwrap_or_default();
        let scheduler = SchedulerSettings {
            address: scheduler_file
                .address
                .or_else(|| cli.scheduler_address.clone())
                .filter(|address| !address.trim().is_empty()),
            epoch: scheduler_file.epoch.unwrap_or(cli.scheduler_epoch),
        };

        let defaults = NotifierSettings::default();
        let notifier_file = file.notifier.unwrap_or_default();
        let notifier = NotifierSettings {
            retry_enabled: notifier_file
                .retry_enabled
                .unwrap_or(defaults.retry_enabled),
            init_interval_secs: notifier_file
                .init_interval_secs
                .unwrap_or(defaults.init_interval_secs),
            max_interval_secs: notifier_file
                .max_interval_secs
                .unwrap_or(defaults.max_interval_secs),
            max_retries: notifier_file.max_retries.unwrap_or(defaults.max_retries),
            request_timeout_secs: notifier_file
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
            idle_wait_secs: notifier_file
                .idle_wait_secs
                .unwrap_or(defaults.idle_wait_secs),
        };

        if !(notifier.init_interval_secs.is_finite() && notifier.init_interval_secs > 0.0) {
            bail!(
                "notifier.init_interval_secs must be positive, got {}",
                notifier.init_interval_secs
            );
        }
        if !notifier.max_interval_secs.is_finite()
            || notifier.max_interval_secs < notifier.init_interval_secs
        {
            bail!(
                "notifier.max_interval_secs ({}) must be at least init_interval_secs ({})",
                notifier.max_interval_secs,
                notifier.init_interval_secs
            );
        }
        if notifier.max_interval_secs > MAX_RETRY_INTERVAL_SECS {
            bail!(
                "notifier.max_interval_secs ({}) must not exceed {}",
                notifier.max_interval_secs,
                MAX_RETRY_INTERVAL_SECS
            );
        }
        if notifier.request_timeout_secs == 0 {
            bail!("notifier.request_timeout_secs must be positive");
        }
        if notifier.idle_wait_secs == 0 {
            bail!("notifier.idle_wait_secs must be positive");
        }

        Ok(Self {
            port,
            workers,
            shutdown_timeout_secs,
            scheduler,
            notifier,
        })
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
