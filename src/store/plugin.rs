//! Cache Plugin
//!
//! Store-wide installation of a cache, and a per-handler wrapper for stores
//! that do not install one.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::cache::Cache;
use crate::config::CacheOptions;
use crate::error::ActionResult;
use crate::store::{ActionContext, ActionHandler, Plugin, Store};

/// Creates a store plugin that attaches a new cache with `options`.
///
/// The same cache instance serves the store and every module context.
pub fn create_cache(options: CacheOptions) -> Plugin {
    Box::new(move |store: &Store| {
        let cache = Cache::from_arc(store.dispatcher(), options);
        store.install_cache(cache);
    })
}

/// Wraps a handler so its context always carries a cache.
///
/// When the store has a cache installed the handler sees that one. Otherwise
/// the wrapper creates one cache with `options` on first invocation and
/// reuses it for every later invocation of this handler.
pub fn cache_action<F, Fut>(f: F, options: CacheOptions) -> ActionHandler
where
    F: Fn(ActionContext, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult> + Send + 'static,
{
    let scoped: OnceLock<Cache> = OnceLock::new();

    Arc::new(move |ctx: ActionContext, payload: Option<Value>| -> BoxFuture<'static, ActionResult> {
        let ctx = if ctx.cache().is_some() {
            ctx
        } else {
            let cache = scoped
                .get_or_init(|| Cache::from_arc(ctx.store().dispatcher(), options.clone()))
                .clone();
            ctx.with_cache(cache)
        };
        f(ctx, payload).boxed()
    })
}
