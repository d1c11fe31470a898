//! API Module
//!
//! HTTP handlers and routing that expose a store's cache over REST.
//!
//! # Endpoints
//! - `POST /dispatch` - Dispatch an action through the cache
//! - `POST /has` - Check for a live entry
//! - `POST /delete` - Remove one entry
//! - `POST /clear` - Remove all entries, or those of one action
//! - `GET /state` - Snapshot of the cache entries
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
