//! HTTP delivery of completion results to the scheduler.

use super::models::{ExecuteResultRequest, ExecuteResultResponse, EXECUTE_RESULT_PATH};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Reasons a single delivery attempt failed. All of them are retried.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("No scheduler address configured")]
    NoSchedulerAddress,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Scheduler rejected result with code {code}: {detail}")]
    Rejected { code: i64, detail: String },
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Http(err.to_string())
    }
}

/// Sends an execute-result request to a scheduler.
#[async_trait]
pub trait NotifyTransport: Send + Sync {
    async fn send(
        &self,
        address: &str,
        request: &ExecuteResultRequest,
    ) -> Result<ExecuteResultResponse, DeliveryError>;
}

/// [`NotifyTransport`] posting JSON over HTTP.
#[derive(Clone)]
pub struct HttpNotifyTransport {
    client: Client,
}

impl HttpNotifyTransport {
    /// # Arguments
    /// * `timeout` - Per-request timeout, connection included
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NotifyTransport for HttpNotifyTransport {
    async fn send(
        &self,
        address: &str,
        request: &ExecuteResultRequest,
    ) -> Result<ExecuteResultResponse, DeliveryError> {
        let url = format!("{}{}", address.trim_end_matches('/'), EXECUTE_RESULT_PATH);
        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(DeliveryError::Http(format!(
                "{} responded with status {}",
                url,
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}
