//! Dispatch Cache - single-flight memoization of async action dispatch
//!
//! Caches the pending result of an action keyed by its name and payload, so
//! concurrent and repeated dispatches of the same call share one invocation
//! until the entry expires, is removed, or the action fails.

pub mod api;
pub mod cache;
pub mod config;
pub mod demo;
pub mod error;
pub mod models;
pub mod store;

pub use api::AppState;
pub use cache::{Cache, DispatchArgs, DispatchOptions};
pub use config::{CacheOptions, Config};
pub use error::{ActionError, ActionResult, CacheError};
pub use store::{cache_action, create_cache, ActionContext, CachedActions, Module, Store};
