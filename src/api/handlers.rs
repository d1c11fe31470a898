//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use axum::{body::Bytes, extract::State, Json};
use tracing::debug;

use crate::cache::{derive_key, Cache, CacheState, DispatchArgs};
use crate::config::Config;
use crate::demo::demo_store;
use crate::error::{CacheError, Result};
use crate::models::{
    CallRequest, ClearRequest, ClearResponse, DeleteResponse, DispatchResponse, HasResponse,
    HealthResponse, StatsResponse,
};
use crate::store::Store;

/// Application state shared across all handlers.
///
/// Holds the host store; its attached cache serves every endpoint.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
}

impl AppState {
    /// Creates a new AppState over the given store.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Builds the demo store with a cache using the configured timeout.
    pub fn from_config(config: &Config) -> Self {
        Self::new(demo_store(config))
    }

    fn cache(&self) -> Result<&Cache> {
        self.store.cache().ok_or(CacheError::CacheNotInstalled)
    }
}

/// Parses and validates a call body into dispatch arguments.
fn call_args(req: CallRequest) -> Result<DispatchArgs> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }
    Ok(req.into())
}

/// Handler for POST /dispatch
///
/// Dispatches an action through the cache and waits for its result.
pub async fn dispatch_handler(
    State(state): State<AppState>,
    Json(req): Json<CallRequest>,
) -> Result<Json<DispatchResponse>> {
    let args = call_args(req)?;
    let cache = state.cache()?;

    let key = derive_key(&args).ok().map(String::from);
    let cached = key.is_some() && cache.has(args.clone());
    debug!(key = ?key, cached, "Dispatch request");

    let value = cache.dispatch(args).await?;

    Ok(Json(DispatchResponse { key, cached, value }))
}

/// Handler for POST /has
pub async fn has_handler(
    State(state): State<AppState>,
    Json(req): Json<CallRequest>,
) -> Result<Json<HasResponse>> {
    let args = call_args(req)?;
    let cached = state.cache()?.has(args);

    Ok(Json(HasResponse { cached }))
}

/// Handler for POST /delete
pub async fn delete_handler(
    State(state): State<AppState>,
    Json(req): Json<CallRequest>,
) -> Result<Json<DeleteResponse>> {
    let args = call_args(req)?;
    let deleted = state.cache()?.delete(args);

    Ok(Json(DeleteResponse { deleted }))
}

/// Handler for POST /clear
///
/// Clears every entry when the body is empty, or only the entries of one
/// action when the body names it. A malformed body clears nothing.
pub async fn clear_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ClearResponse>> {
    let req = ClearRequest::from_body(&body).map_err(CacheError::InvalidRequest)?;
    let cache = state.cache()?;

    let response = match req.scope() {
        Some(action) => ClearResponse::scoped(cache.clear_action(action)),
        None => {
            cache.clear();
            ClearResponse::all()
        }
    };

    Ok(Json(response))
}

/// Handler for GET /state
///
/// Returns a snapshot of every entry keyed by cache key.
pub async fn state_handler(State(state): State<AppState>) -> Result<Json<CacheState>> {
    Ok(Json(state.cache()?.state()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let stats = state.cache()?.stats();
    Ok(Json(StatsResponse::from(stats)))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
