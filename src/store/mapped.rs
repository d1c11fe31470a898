//! Scoped Cached Dispatch
//!
//! Callable surface for code outside the store (components, request
//! handlers) that dispatches the actions of one namespace through the cache.

use serde_json::Value;

use crate::cache::{Cache, DispatchArgs, DispatchOptions, ResultHandle};

/// Ensures a non-empty namespace ends with `/`.
pub fn normalize_namespace(namespace: &str) -> String {
    if namespace.is_empty() || namespace.ends_with('/') {
        namespace.to_string()
    } else {
        format!("{}/", namespace)
    }
}

/// Cached dispatch bound to one namespace.
///
/// Names passed here are relative; the cache sees the fully-qualified name,
/// so entries are shared with dispatches issued through the root cache.
#[derive(Debug, Clone)]
pub struct CachedActions {
    cache: Cache,
    namespace: String,
}

impl CachedActions {
    pub(crate) fn new(cache: Cache, namespace: String) -> Self {
        Self { cache, namespace }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fully-qualified name of `action`.
    pub fn qualify(&self, action: &str) -> String {
        format!("{}{}", self.namespace, action)
    }

    pub fn dispatch(&self, action: &str, payload: Option<Value>) -> ResultHandle {
        self.dispatch_with(action, payload, None)
    }

    pub fn dispatch_with(
        &self,
        action: &str,
        payload: Option<Value>,
        options: Option<DispatchOptions>,
    ) -> ResultHandle {
        self.cache.dispatch(DispatchArgs::Positional {
            action: self.qualify(action),
            payload,
            options,
        })
    }

    pub fn has(&self, action: &str, payload: Option<Value>) -> bool {
        self.cache.has(DispatchArgs::Positional {
            action: self.qualify(action),
            payload,
            options: None,
        })
    }
}
