//! Test server lifecycle management
//!
//! Spawns the executor API on a random port, backed by the built-in job
//! registry and a notifier with short retry intervals.

use super::constants::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use trigger_executor::executor::Executor;
use trigger_executor::jobs::default_registry;
use trigger_executor::notifier::{HttpNotifyTransport, Notifier, SchedulerInfoCell};
use trigger_executor::server::{make_app, metrics, ServerState};
use trigger_executor::timer::{ExponentialBackoffWithJitter, Timer};

/// A running executor server.
///
/// The server shuts down gracefully when dropped.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Port the server is listening on
    #[allow(dead_code)]
    pub port: u16,

    /// Shared state, for assertions that bypass HTTP
    #[allow(dead_code)]
    pub state: ServerState,

    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a server that reports results to `scheduler_address`.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound or the server never becomes ready.
    pub async fn spawn(scheduler_address: Option<String>) -> Self {
        metrics::init_metrics();

        let executor = Executor::new(Arc::new(default_registry()), TEST_WORKERS);
        let transport =
            HttpNotifyTransport::new(Duration::from_secs(2)).expect("Failed to build transport");
        let strategy = Arc::new(ExponentialBackoffWithJitter::new(
            Duration::from_millis(TEST_RETRY_INIT_MS),
            Duration::from_millis(200),
            20,
        ));
        let notifier = Arc::new(Notifier::with_timer(
            Arc::new(transport),
            Arc::new(SchedulerInfoCell::new(scheduler_address, 1)),
            Timer::with_idle_wait(strategy, Duration::from_millis(100)),
        ));
        notifier.start().expect("Failed to start notifier");

        let state = ServerState::new(executor, notifier);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let app = make_app(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            state,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling /health
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/health", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await,
            }
        }
    }

    /// Stops the executor and flushes pending notifications.
    #[allow(dead_code)]
    pub async fn shutdown_services(&self) {
        let timeout = Some(Duration::from_secs(5));
        self.state
            .executor
            .shutdown(timeout)
            .await
            .expect("Executor shutdown timed out");
        self.state
            .notifier
            .shutdown(timeout)
            .await
            .expect("Notifier shutdown timed out");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
