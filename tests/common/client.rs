//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per executor endpoint. When routes or
//! request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    #[allow(dead_code)]
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

#[allow(dead_code)]
impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Triggers
    // ========================================================================

    pub async fn post_trigger(&self, trigger_id: &str, class_name: &str, params: JsonValue) -> Response {
        self.client
            .post(format!("{}/triggers", self.base_url))
            .json(&json!({
                "triggerId": trigger_id,
                "jobId": TEST_JOB_ID,
                "name": format!("{}-name", trigger_id),
                "className": class_name,
                "params": params,
            }))
            .send()
            .await
            .expect("POST /triggers failed")
    }

    pub async fn get_triggers(&self) -> Response {
        self.client
            .get(format!("{}/triggers", self.base_url))
            .send()
            .await
            .expect("GET /triggers failed")
    }

    pub async fn get_trigger(&self, trigger_id: &str) -> Response {
        self.client
            .get(format!("{}/triggers/{}", self.base_url, trigger_id))
            .send()
            .await
            .expect("GET /triggers/{id} failed")
    }

    pub async fn interrupt_trigger(&self, trigger_id: &str) -> Response {
        self.client
            .post(format!("{}/triggers/{}/interrupt", self.base_url, trigger_id))
            .send()
            .await
            .expect("POST /triggers/{id}/interrupt failed")
    }

    /// Polls until the trigger is no longer live (404).
    ///
    /// # Panics
    ///
    /// Panics if it is still live after [`CONDITION_TIMEOUT_MS`].
    pub async fn wait_until_gone(&self, trigger_id: &str) {
        let start = std::time::Instant::now();
        loop {
            if self.get_trigger(trigger_id).await.status() == reqwest::StatusCode::NOT_FOUND {
                return;
            }
            if start.elapsed() > Duration::from_millis(CONDITION_TIMEOUT_MS) {
                panic!("Trigger {} still live after {}ms", trigger_id, CONDITION_TIMEOUT_MS);
            }
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    // ========================================================================
    // Scheduler and service
    // ========================================================================

    pub async fn get_scheduler(&self) -> Response {
        self.client
            .get(format!("{}/scheduler", self.base_url))
            .send()
            .await
            .expect("GET /scheduler failed")
    }

    pub async fn put_scheduler(&self, address: Option<&str>, epoch: i64) -> Response {
        self.client
            .put(format!("{}/scheduler", self.base_url))
            .json(&json!({"address": address, "epoch": epoch}))
            .send()
            .await
            .expect("PUT /scheduler failed")
    }

    pub async fn get_health(&self) -> Response {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .expect("GET /health failed")
    }

    pub async fn get_metrics(&self) -> Response {
        self.client
            .get(format!("{}/metrics", self.base_url))
            .send()
            .await
            .expect("GET /metrics failed")
    }
}
