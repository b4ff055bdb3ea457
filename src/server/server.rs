use anyhow::{Context, Result};
use axum::{middleware, routing::get, Router};
use std::future::Future;
use tracing::info;

use super::metrics::metrics_handler;
use super::http_layers::log_requests;
use super::state::ServerState;
use super::trigger_routes::trigger_routes;

pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .merge(trigger_routes())
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Serves the API on `port` until `shutdown` resolves.
pub async fn run_server<F>(state: ServerState, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Executor, TriggerInfo, TriggerState};
    use crate::jobs::default_registry;
    use crate::notifier::models::{ExecuteResultRequest, ExecuteResultResponse};
    use crate::notifier::{DeliveryError, Notifier, NotifyTransport, SchedulerInfoCell};
    use crate::server::metrics;
    use crate::timer::NoRetry;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value as JsonValue};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt; // for `oneshot`

    struct AcceptAllTransport;

    #[async_trait]
    impl NotifyTransport for AcceptAllTransport {
        async fn send(
            &self,
            _address: &str,
            _request: &ExecuteResultRequest,
        ) -> Result<ExecuteResultResponse, DeliveryError> {
            Ok(ExecuteResultResponse::with_code(0, ""))
        }
    }

    fn test_state() -> ServerState {
        metrics::init_metrics();
        let notifier = Arc::new(Notifier::new(
            Arc::new(AcceptAllTransport),
            Arc::new(SchedulerInfoCell::new(Some("http://sched".to_string()), 1)),
            Arc::new(NoRetry),
        ));
        notifier.start().unwrap();
        ServerState::new(Executor::new(Arc::new(default_registry()), 2), notifier)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<JsonValue>,
    ) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn sleep_request(id: &str, seconds: u64) -> JsonValue {
        json!({
            "triggerId": id,
            "jobId": "job-1",
            "name": "nap",
            "className": "builtin.Sleep",
            "params": {"seconds": seconds}
        })
    }

    #[tokio::test]
    async fn test_post_trigger_accepted() {
        let state = test_state();
        let app = make_app(state.clone());

        let (status, body) = send(&app, "POST", "/triggers", Some(sleep_request("t1", 30))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let info: TriggerInfo = serde_json::from_slice(&body).unwrap();
        assert_eq!(info.trigger_id, "t1");
        assert_eq!(info.class_name, "builtin.Sleep");

        let (status, body) = send(&app, "GET", "/triggers/t1", None).await;
        assert_eq!(status, StatusCode::OK);
        let info: TriggerInfo = serde_json::from_slice(&body).unwrap();
        assert_eq!(info.job_id, "job-1");

        state.executor.shutdown(Some(Duration::from_secs(5))).await.unwrap();
    }

    #[tokio::test]
    async fn test_post_duplicate_conflicts() {
        let state = test_state();
        let app = make_app(state.clone());

        let (status, _) = send(&app, "POST", "/triggers", Some(sleep_request("t1", 30))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let (status, _) = send(&app, "POST", "/triggers", Some(sleep_request("t1", 30))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        state.executor.shutdown(Some(Duration::from_secs(5))).await.unwrap();
    }

    #[tokio::test]
    async fn test_post_unknown_class_is_bad_request() {
        let app = make_app(test_state());

        let (status, body) = send(
            &app,
            "POST",
            "/triggers",
            Some(json!({"triggerId": "t1", "jobId": "j", "name": "n", "className": "nope.Job"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(body).unwrap().contains("nope.Job"));
    }

    #[tokio::test]
    async fn test_missing_trigger_is_not_found() {
        let app = make_app(test_state());

        let (status, _) = send(&app, "GET", "/triggers/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "POST", "/triggers/missing/interrupt", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_interrupt_route_moves_trigger_out_of_running() {
        let state = test_state();
        let app = make_app(state.clone());

        send(&app, "POST", "/triggers", Some(sleep_request("t1", 30))).await;
        let (status, body) = send(&app, "POST", "/triggers/t1/interrupt", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let info: TriggerInfo = serde_json::from_slice(&body).unwrap();
        assert!(matches!(
            info.state,
            TriggerState::Interrupting | TriggerState::Interrupted
        ));

        state.executor.shutdown(Some(Duration::from_secs(5))).await.unwrap();
        let (_, body) = send(&app, "GET", "/triggers", None).await;
        let infos: Vec<TriggerInfo> = serde_json::from_slice(&body).unwrap();
        assert!(infos.is_empty());
    }

    #[tokio::test]
    async fn test_list_is_sorted_by_id() {
        let state = test_state();
        let app = make_app(state.clone());

        send(&app, "POST", "/triggers", Some(sleep_request("b", 30))).await;
        send(&app, "POST", "/triggers", Some(sleep_request("a", 30))).await;

        let (_, body) = send(&app, "GET", "/triggers", None).await;
        let infos: Vec<TriggerInfo> = serde_json::from_slice(&body).unwrap();
        let ids: Vec<&str> = infos.iter().map(|i| i.trigger_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        state.executor.shutdown(Some(Duration::from_secs(5))).await.unwrap();
    }

    #[tokio::test]
    async fn test_post_after_shutdown_is_unavailable() {
        let state = test_state();
        let app = make_app(state.clone());
        state.executor.shutdown(None).await.unwrap();

        let (status, _) = send(&app, "POST", "/triggers", Some(sleep_request("t1", 1))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_put_scheduler_updates_delivery_target() {
        let state = test_state();
        let app = make_app(state.clone());

        let (status, _) = send(
            &app,
            "PUT",
            "/scheduler",
            Some(json!({"address": "http://new-scheduler:9000", "epoch": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let info = state.scheduler_info.snapshot();
        assert_eq!(info.address.as_deref(), Some("http://new-scheduler:9000"));
        assert_eq!(info.epoch, 5);

        let (_, body) = send(&app, "GET", "/scheduler", None).await;
        let value: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["address"], "http://new-scheduler:9000");
        assert_eq!(value["epoch"], 5);
    }

    #[tokio::test]
    async fn test_metrics_and_health_respond() {
        let app = make_app(test_state());

        let (status, body) = send(&app, "GET", "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("trigger_executor_"));

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let value: JsonValue = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["liveTriggers"], 0);
    }
}
