//! Request logging middleware

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{debug, info, warn};

pub async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let uri = request.uri().to_string();

    debug!(">>> {} {}", method, uri);
    let response = next.run(request).await;

    let status = response.status();
    let elapsed = start.elapsed();
    if status.is_server_error() {
        warn!("<<< {} {} {} ({:?})", method, uri, status.as_u16(), elapsed);
    } else if uri != "/metrics" {
        info!("<<< {} {} {} ({:?})", method, uri, status.as_u16(), elapsed);
    }

    response
}
