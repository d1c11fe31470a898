//! Action Context
//!
//! What a handler receives alongside its payload.

use futures::future::BoxFuture;
use serde_json::Value;

use crate::cache::{ActionCall, Cache};
use crate::error::ActionResult;
use crate::store::Store;

/// Execution context of one action invocation.
#[derive(Clone)]
pub struct ActionContext {
    store: Store,
    namespace: String,
    cache: Option<Cache>,
}

impl ActionContext {
    pub(crate) fn new(store: Store, namespace: String, cache: Option<Cache>) -> Self {
        Self {
            store,
            namespace,
            cache,
        }
    }

    /// Namespace of the module that declared the action, `""` at the root.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The cache bound to this context.
    ///
    /// It is the store's cache when one is installed. Cache keys always use
    /// fully-qualified action names, whichever context dispatches.
    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    /// Uncached dispatch of `action` relative to this context's namespace.
    pub fn dispatch(&self, action: &str, payload: Option<Value>) -> BoxFuture<'static, ActionResult> {
        let full_name = format!("{}{}", self.namespace, action);
        self.store.dispatch(ActionCall::new(full_name, payload))
    }

    pub(crate) fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }
}
