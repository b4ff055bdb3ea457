//! Fake scheduler receiving execution results.
//!
//! Records every `executeResult` request and answers with queued response
//! codes, falling back to code 0 once the queue is empty.

use super::constants::*;
use axum::{extract::State, routing::post, Json, Router};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use trigger_executor::notifier::models::{
    ExecuteResultRequest, ExecuteResultResponse, EXECUTE_RESULT_PATH,
};

#[derive(Clone, Default)]
struct FakeSchedulerState {
    received: Arc<Mutex<Vec<ExecuteResultRequest>>>,
    codes: Arc<Mutex<VecDeque<i64>>>,
}

async fn execute_result(
    State(state): State<FakeSchedulerState>,
    Json(request): Json<ExecuteResultRequest>,
) -> Json<ExecuteResultResponse> {
    state.received.lock().unwrap().push(request);
    let code = state.codes.lock().unwrap().pop_front().unwrap_or(0);
    let detail = if code == 0 { "" } else { "rejected by test" };
    Json(ExecuteResultResponse::with_code(code, detail))
}

pub struct FakeScheduler {
    /// Address to hand to the executor as the scheduler address
    pub base_url: String,
    state: FakeSchedulerState,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

#[allow(dead_code)]
impl FakeScheduler {
    pub async fn spawn() -> Self {
        let state = FakeSchedulerState::default();
        let app = Router::new()
            .route(EXECUTE_RESULT_PATH, post(execute_result))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Fake scheduler failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Queues response codes for the next requests, in order.
    pub fn respond_with(&self, codes: &[i64]) {
        self.state.codes.lock().unwrap().extend(codes.iter().copied());
    }

    pub fn received(&self) -> Vec<ExecuteResultRequest> {
        self.state.received.lock().unwrap().clone()
    }

    /// Waits until at least `count` requests arrived and returns all of them.
    ///
    /// # Panics
    ///
    /// Panics if they do not arrive within [`CONDITION_TIMEOUT_MS`].
    pub async fn wait_for_results(&self, count: usize) -> Vec<ExecuteResultRequest> {
        let start = std::time::Instant::now();
        loop {
            let received = self.received();
            if received.len() >= count {
                return received;
            }
            if start.elapsed() > Duration::from_millis(CONDITION_TIMEOUT_MS) {
                panic!(
                    "Expected {} result(s) within {}ms, got {}",
                    count,
                    CONDITION_TIMEOUT_MS,
                    received.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }
}

impl Drop for FakeScheduler {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
