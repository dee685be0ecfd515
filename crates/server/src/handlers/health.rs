//! Liveness endpoint.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::time::Duration;

/// Deadline for the metadata store ping.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(1);

/// GET /healthz - 200 when the metadata store answers in time.
///
/// Unauthenticated so load balancers can poll it.
pub async fn health_check(State(state): State<AppState>) -> Response {
    let error = match tokio::time::timeout(HEALTH_TIMEOUT, state.metadata.health_check()).await {
        Ok(Ok(())) => return StatusCode::OK.into_response(),
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("health check timed out after {}s", HEALTH_TIMEOUT.as_secs()),
    };

    tracing::error!(error = %error, "Health check failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{error}\n")).into_response()
}
