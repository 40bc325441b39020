use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::bridge::Bridge;

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Per-request summary line, including how many requests are still waiting on the
/// engine. Hosts embedding the bridge can layer this onto their own router with
/// `axum::middleware::from_fn_with_state(bridge, request_logging_middleware)`.
pub async fn request_logging_middleware(
    State(bridge): State<Bridge>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis();
    let pending = bridge.registry().len();

    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = elapsed_ms,
        pending,
        "bridged request"
    );

    match status {
        StatusCode::GATEWAY_TIMEOUT => warn!(
            path = %path,
            reply_timeout_ms = bridge.config().reply_timeout.as_millis(),
            pending,
            "engine did not reply in time"
        ),
        StatusCode::SERVICE_UNAVAILABLE => warn!(
            path = %path,
            closed = bridge.is_closed(),
            "request resolved without a reply"
        ),
        _ => {}
    }

    response
}
