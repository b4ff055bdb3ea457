//! Wire types of the scheduler's result endpoint.

use crate::executor::{JobParams, Trigger, TriggerOutcome, TriggerState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Response codes meaning the scheduler has the result. 17003 and 17004
/// report that it was already acknowledged earlier.
pub const ACCEPTED_CODES: [i64; 3] = [0, 17003, 17004];

/// Path appended to the scheduler address.
pub const EXECUTE_RESULT_PATH: &str = "/internal/executeResult";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerInfoPayload {
    pub address: String,
    pub epoch: i64,
    pub time_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerContext {
    pub job_id: String,
    pub trigger_id: String,
    pub time_stamp: DateTime<Utc>,
    pub job_name: String,
    pub class_name: String,
    pub params: JobParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotifyStatus {
    Success,
    Failed,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultBody {
    pub context: TriggerContext,
    pub status: NotifyStatus,
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResultRequest {
    pub scheduler_info: SchedulerInfoPayload,
    pub body: ResultBody,
}

impl ExecuteResultRequest {
    pub fn new(scheduler_info: SchedulerInfoPayload, trigger: &Trigger) -> Self {
        let (status, msg) = match (trigger.state(), trigger.outcome()) {
            (TriggerState::Interrupted, Some(TriggerOutcome::Error(err))) => {
                (NotifyStatus::Interrupted, err.to_string())
            }
            (TriggerState::Interrupted, _) => (NotifyStatus::Interrupted, String::new()),
            (_, Some(TriggerOutcome::Error(err))) => (NotifyStatus::Failed, err.to_string()),
            _ => (NotifyStatus::Success, String::new()),
        };

        Self {
            scheduler_info,
            body: ResultBody {
                context: TriggerContext {
                    job_id: trigger.job_id().to_string(),
                    trigger_id: trigger.trigger_id().to_string(),
                    time_stamp: trigger.time_completed().unwrap_or_else(Utc::now),
                    job_name: trigger.name().to_string(),
                    class_name: trigger.class_name().to_string(),
                    params: trigger.params().clone(),
                },
                status,
                msg,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseStatus {
    pub code: i64,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub server_response_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResultResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub body: JsonValue,
}

impl ExecuteResultResponse {
    pub fn with_code(code: i64, detail: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus {
                code,
                detail: detail.into(),
                server_response_time: Some(Utc::now().timestamp_millis()),
            },
            body: JsonValue::Null,
        }
    }

    pub fn is_accepted(&self) -> bool {
        ACCEPTED_CODES.contains(&self.status.code)
    }
}
