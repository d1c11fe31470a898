//! Error types for the dispatch cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Action Error ==
/// Failure reported by an underlying action dispatch.
///
/// Cached result handles are shared between callers, so the error must be
/// cheap to clone. The cache never wraps or rewrites it: whoever awaits a
/// handle observes exactly what the action produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// No handler is registered under the fully-qualified name
    #[error("unknown action type: {0}")]
    UnknownAction(String),

    /// The handler ran and rejected
    #[error("{0}")]
    Failed(String),

    /// The spawned dispatch panicked or was cancelled by the runtime
    #[error("action aborted: {0}")]
    Aborted(String),

    /// The host store was dropped while the cache still referenced it
    #[error("store dropped before dispatching {0}")]
    StoreDropped(String),
}

impl ActionError {
    /// Convenience constructor for handler rejections.
    pub fn failed(message: impl Into<String>) -> Self {
        ActionError::Failed(message.into())
    }
}

/// Outcome of one action dispatch.
pub type ActionResult = std::result::Result<serde_json::Value, ActionError>;

// == Cache Error Enum ==
/// Unified error type for the cache and its binding surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Call arguments could not be turned into a deterministic key
    #[error("Can't generate key from parameters: {0}")]
    KeyDerivation(String),

    /// A module namespace was referenced but never registered
    #[error("Module namespace not found: {0}")]
    NamespaceNotFound(String),

    /// The store has no cache attached
    #[error("Cache is not installed on this store")]
    CacheNotInstalled,

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The dispatched action rejected
    #[error("Action failed: {0}")]
    Action(#[from] ActionError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::KeyDerivation(_) | CacheError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::NamespaceNotFound(_) => StatusCode::NOT_FOUND,
            CacheError::CacheNotInstalled => StatusCode::CONFLICT,
            CacheError::Action(ActionError::UnknownAction(_)) => StatusCode::NOT_FOUND,
            CacheError::Action(_) => StatusCode::BAD_GATEWAY,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the dispatch cache.
pub type Result<T> = std::result::Result<T, CacheError>;
