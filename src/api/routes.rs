//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, delete_handler, dispatch_handler, has_handler, health_handler, state_handler,
    stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /dispatch` - Dispatch an action through the cache
/// - `POST /has` - Check for a live entry
/// - `POST /delete` - Remove one entry
/// - `POST /clear` - Remove all entries, or those of one action
/// - `GET /state` - Snapshot of the cache entries
/// - `GET /stats` - Get cache statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/dispatch", post(dispatch_handler))
        .route("/has", post(has_handler))
        .route("/delete", post(delete_handler))
        .route("/clear", post(clear_handler))
        .route("/state", get(state_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
