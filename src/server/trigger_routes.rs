//! Trigger and scheduler HTTP routes.
//!
//! Provides endpoints for:
//! - Submitting, listing and interrupting triggers
//! - Updating where completion results are delivered

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::executor::{ExecutorError, JobFactoryError, TriggerInfo, TriggerRequest};
use crate::notifier::SchedulerInfo;
use crate::server::state::ServerState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SchedulerUpdateBody {
    pub address: Option<String>,
    #[serde(default)]
    pub epoch: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerInfoResponse {
    pub address: Option<String>,
    pub epoch: i64,
    pub time_updated: DateTime<Utc>,
}

impl From<SchedulerInfo> for SchedulerInfoResponse {
    fn from(info: SchedulerInfo) -> Self {
        Self {
            address: info.address,
            epoch: info.epoch,
            time_updated: info.time_updated,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub live_triggers: usize,
    pub pending_notifications: usize,
}

// =============================================================================
// Helpers
// =============================================================================

fn executor_error_response(err: ExecutorError) -> Response {
    let status = match &err {
        ExecutorError::DuplicateTrigger(_) => StatusCode::CONFLICT,
        ExecutorError::TriggerNotFound(_) => StatusCode::NOT_FOUND,
        ExecutorError::JobFactory(JobFactoryError::UnknownClass(_)) => StatusCode::BAD_REQUEST,
        ExecutorError::JobFactory(JobFactoryError::Instantiation { .. }) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ExecutorError::IllegalState { .. } | ExecutorError::ShutdownTimeout(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    if status.is_server_error() {
        warn!("Executor request failed: {}", err);
    } else {
        debug!("Executor request rejected: {}", err);
    }
    (status, err.to_string()).into_response()
}

// =============================================================================
// Handlers
// =============================================================================

async fn post_trigger(
    State(state): State<ServerState>,
    Json(request): Json<TriggerRequest>,
) -> Response {
    match state
        .executor
        .trigger(request, Some(state.completion_callback()))
    {
        Ok(trigger) => (StatusCode::ACCEPTED, Json(trigger.info())).into_response(),
        Err(e) => executor_error_response(e),
    }
}

async fn get_triggers(State(state): State<ServerState>) -> Response {
    let mut infos: Vec<TriggerInfo> = state
        .executor
        .triggers()
        .iter()
        .map(|trigger| trigger.info())
        .collect();
    infos.sort_by(|a, b| a.trigger_id.cmp(&b.trigger_id));
    Json(infos).into_response()
}

async fn get_trigger(State(state): State<ServerState>, Path(id): Path<String>) -> Response {
    match state.executor.get_trigger(&id) {
        Ok(trigger) => Json(trigger.info()).into_response(),
        Err(e) => executor_error_response(e),
    }
}

async fn interrupt_trigger(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    match state.executor.interrupt(&id) {
        Ok(trigger) => (StatusCode::ACCEPTED, Json(trigger.info())).into_response(),
        Err(e) => executor_error_response(e),
    }
}

async fn get_scheduler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(SchedulerInfoResponse::from(state.scheduler_info.snapshot()))
}

async fn put_scheduler(
    State(state): State<ServerState>,
    Json(body): Json<SchedulerUpdateBody>,
) -> impl IntoResponse {
    let address = body.address.filter(|address| !address.trim().is_empty());
    let info = state.scheduler_info.update(address, body.epoch);
    info!(
        "Scheduler updated to {:?} (epoch {})",
        info.address, info.epoch
    );
    Json(SchedulerInfoResponse::from(info))
}

async fn get_health(State(state): State<ServerState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: if state.executor.is_shut_down() {
            "shutting_down".to_string()
        } else {
            "ok".to_string()
        },
        uptime_secs: state.start_time.elapsed().as_secs(),
        live_triggers: state.executor.triggers().len(),
        pending_notifications: state.notifier.pending(),
    })
}

// =============================================================================
// Router
// =============================================================================

pub fn trigger_routes() -> Router<ServerState> {
    Router::new()
        .route("/triggers", post(post_trigger).get(get_triggers))
        .route("/triggers/{id}", get(get_trigger))
        .route("/triggers/{id}/interrupt", post(interrupt_trigger))
        .route("/scheduler", get(get_scheduler).put(put_scheduler))
        .route("/health", get(get_health))
}
