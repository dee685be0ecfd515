//! Route configuration.

use crate::handlers;
use crate::metrics::varz;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let limit = state.config.server.limit_bytes();

    let mut router = Router::new()
        // Uploads; the body limit also bounds streamed multipart data
        .route(
            "/",
            post(handlers::upload)
                .layer(DefaultBodyLimit::max(limit))
                .fallback(handlers::dispatch),
        )
        // Health check (unauthenticated for load balancers)
        .route(
            "/healthz",
            get(handlers::health_check).fallback(handlers::dispatch),
        );

    // When disabled, /varz falls through to the serving pipeline like any
    // other path.
    if state.config.server.metrics_enabled {
        router = router.route("/varz", get(varz).fallback(handlers::dispatch));
    }

    router
        // Static assets, stored entries, OPTIONS and 405s
        .fallback(handlers::dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
