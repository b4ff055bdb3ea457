use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trigger_executor::config::{AppConfig, CliConfig, FileConfig};
use trigger_executor::executor::Executor;
use trigger_executor::jobs::default_registry;
use trigger_executor::notifier::{HttpNotifyTransport, Notifier, SchedulerInfoCell};
use trigger_executor::server::{metrics, run_server, ServerState};
use trigger_executor::timer::Timer;

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8090)]
    pub port: u16,

    /// Maximum number of jobs running at the same time.
    #[clap(short, long, default_value_t = 4)]
    pub workers: usize,

    /// Seconds to wait for running jobs and pending notifications on shutdown.
    #[clap(long, default_value_t = 30)]
    pub shutdown_timeout_secs: u64,

    /// Base URL of the scheduler that receives completion results.
    #[clap(long)]
    pub scheduler_address: Option<String>,

    /// Scheduler epoch reported alongside each result.
    #[clap(long, default_value_t = 0)]
    pub scheduler_epoch: i64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            port: self.port,
            workers: self.workers,
            shutdown_timeout_secs: self.shutdown_timeout_secs,
            scheduler_address: self.scheduler_address.clone(),
            scheduler_epoch: self.scheduler_epoch,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)
        .context("Invalid configuration")?;

    metrics::init_metrics();

    let registry = default_registry();
    info!("Registered job classes: {}", registry.class_names().join(", "));
    let executor = Executor::new(Arc::new(registry), app_config.workers);

    let scheduler_info = Arc::new(SchedulerInfoCell::new(
        app_config.scheduler.address.clone(),
        app_config.scheduler.epoch,
    ));
    if app_config.scheduler.address.is_none() {
        warn!("No scheduler address configured, results are held until PUT /scheduler sets one");
    }
    let transport = HttpNotifyTransport::new(app_config.notifier.request_timeout())?;
    let timer = Timer::with_idle_wait(
        app_config.notifier.retry_strategy(),
        app_config.notifier.idle_wait(),
    );
    let notifier = Arc::new(Notifier::with_timer(
        Arc::new(transport),
        scheduler_info,
        timer,
    ));
    notifier.start()?;

    let state = ServerState::new(executor.clone(), Arc::clone(&notifier));
    let shutdown_token = CancellationToken::new();
    let server_token = shutdown_token.clone();

    info!(
        "Ready to serve at port {} with {} worker(s)!",
        app_config.port,
        executor.workers()
    );

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating graceful shutdown");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let server_result = run_server(state, app_config.port, async move {
        server_token.cancelled().await
    })
    .await;
    match server_result {
        Ok(()) => info!("HTTP server stopped"),
        Err(e) => error!("HTTP server failed: {:#}", e),
    }

    // Executor first so the results of interrupted triggers are still queued
    let timeout = Some(app_config.shutdown_timeout());
    if let Err(e) = executor.shutdown(timeout).await {
        warn!("{}", e);
    }
    if let Err(e) = notifier.shutdown(timeout).await {
        warn!("{}", e);
    }

    info!("Shutdown complete");
    Ok(())
}
