//! Store Module
//!
//! A host state store of named async actions, organised in optionally
//! namespaced modules, plus the surface that binds a [`Cache`] to it.
//!
//! ```ignore
//! let store = Store::builder()
//!     .action("LIST", |_ctx, _payload| async { Ok(json!([1, 2, 3])) })
//!     .module("user", Module::namespaced().action("rename", |_ctx, name| async move {
//!         Ok(name.unwrap_or_default())
//!     }))
//!     .plugin(create_cache(CacheOptions::with_timeout(60_000)))
//!     .build();
//!
//! let cache = store.cache().unwrap();
//! cache.dispatch("LIST").await?;
//! ```

mod context;
mod mapped;
mod plugin;

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, OnceLock, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::cache::{ActionCall, Cache, Dispatch};
use crate::error::{ActionError, ActionResult, CacheError, Result};

pub use context::ActionContext;
pub use mapped::{normalize_namespace, CachedActions};
pub use plugin::{cache_action, create_cache};

/// A registered action handler.
pub type ActionHandler =
    Arc<dyn Fn(ActionContext, Option<Value>) -> BoxFuture<'static, ActionResult> + Send + Sync>;

/// Runs once against the freshly built store.
pub type Plugin = Box<dyn FnOnce(&Store) + Send>;

/// Boxes an async closure into an [`ActionHandler`].
pub fn handler<F, Fut>(f: F) -> ActionHandler
where
    F: Fn(ActionContext, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult> + Send + 'static,
{
    Arc::new(move |ctx: ActionContext, payload: Option<Value>| -> BoxFuture<'static, ActionResult> {
        f(ctx, payload).boxed()
    })
}

// == Module ==
/// A group of actions, optionally behind its own namespace.
#[derive(Default)]
pub struct Module {
    namespaced: bool,
    actions: Vec<(String, ActionHandler)>,
    modules: Vec<(String, Module)>,
}

impl Module {
    /// A module whose actions register under the parent's namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// A module whose actions register under `<parent namespace><name>/`.
    pub fn namespaced() -> Self {
        Self {
            namespaced: true,
            ..Self::default()
        }
    }

    pub fn action<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActionContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        self.handler(name, handler(f))
    }

    /// Registers an already boxed handler, e.g. one wrapped by [`cache_action`].
    pub fn handler(mut self, name: impl Into<String>, handler: ActionHandler) -> Self {
        self.actions.push((name.into(), handler));
        self
    }

    pub fn module(mut self, name: impl Into<String>, module: Module) -> Self {
        self.modules.push((name.into(), module));
        self
    }
}

// == Store Builder ==
#[derive(Default)]
pub struct StoreBuilder {
    root: Module,
    plugins: Vec<Plugin>,
}

impl StoreBuilder {
    pub fn action<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActionContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        self.root = self.root.action(name, f);
        self
    }

    pub fn handler(mut self, name: impl Into<String>, handler: ActionHandler) -> Self {
        self.root = self.root.handler(name, handler);
        self
    }

    pub fn module(mut self, name: impl Into<String>, module: Module) -> Self {
        self.root = self.root.module(name, module);
        self
    }

    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Registers every action under its fully-qualified name, then runs the
    /// plugins in order.
    pub fn build(self) -> Store {
        let mut actions = HashMap::new();
        let mut namespaces = BTreeSet::new();
        register(&mut actions, &mut namespaces, "", self.root);

        let store = Store {
            inner: Arc::new(StoreInner {
                actions,
                namespaces,
                cache: OnceLock::new(),
            }),
        };

        for plugin in self.plugins {
            plugin(&store);
        }

        store
    }
}

fn register(
    actions: &mut HashMap<String, RegisteredAction>,
    namespaces: &mut BTreeSet<String>,
    namespace: &str,
    module: Module,
) {
    for (name, handler) in module.actions {
        let full_name = format!("{}{}", namespace, name);
        let registered = RegisteredAction {
            handler,
            namespace: namespace.to_string(),
        };
        if actions.insert(full_name.clone(), registered).is_some() {
            warn!(action = %full_name, "Duplicate action registration, last one wins");
        }
    }

    for (name, child) in module.modules {
        let child_namespace = if child.namespaced {
            let child_namespace = format!("{}{}/", namespace, name);
            namespaces.insert(child_namespace.clone());
            child_namespace
        } else {
            namespace.to_string()
        };
        register(actions, namespaces, &child_namespace, child);
    }
}

struct RegisteredAction {
    handler: ActionHandler,
    /// Namespace of the module that declared the action
    namespace: String,
}

// == Store ==
/// Host store. Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    actions: HashMap<String, RegisteredAction>,
    /// Namespaces of namespaced modules, each ending in `/`
    namespaces: BTreeSet<String>,
    cache: OnceLock<Cache>,
}

impl Store {
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    // == Dispatch ==
    /// Invokes the handler registered under `call.action`.
    ///
    /// The handler is called immediately; the returned future completes its
    /// asynchronous part.
    pub fn dispatch(&self, call: ActionCall) -> BoxFuture<'static, ActionResult> {
        let Some(registered) = self.inner.actions.get(&call.action) else {
            error!(action = %call.action, "Unknown action type");
            return futures::future::ready(Err(ActionError::UnknownAction(call.action))).boxed();
        };

        let ctx = ActionContext::new(
            self.clone(),
            registered.namespace.clone(),
            self.cache().cloned(),
        );
        (registered.handler)(ctx, call.payload)
    }

    /// Capability handed to a cache bound to this store.
    ///
    /// Holds the store weakly so a cache attached to the store does not keep
    /// it alive.
    pub fn dispatcher(&self) -> Arc<dyn Dispatch> {
        Arc::new(StoreDispatcher {
            store: Arc::downgrade(&self.inner),
        })
    }

    // == Cache Binding ==
    /// The cache attached to this store, shared by every module context.
    pub fn cache(&self) -> Option<&Cache> {
        self.inner.cache.get()
    }

    /// Attaches `cache` to the store and all its module contexts.
    ///
    /// The attachment is permanent: a second install is ignored and returns
    /// false.
    pub fn install_cache(&self, cache: Cache) -> bool {
        match self.inner.cache.set(cache) {
            Ok(()) => {
                debug!(
                    namespaces = self.inner.namespaces.len(),
                    "Cache attached to store and module contexts"
                );
                true
            }
            Err(_) => {
                warn!("Store already has a cache attached, ignoring install");
                false
            }
        }
    }

    /// Scoped cached dispatch for the actions of `namespace`.
    ///
    /// An empty namespace scopes to the root. The namespace may omit its
    /// trailing `/`.
    pub fn cached_actions(&self, namespace: &str) -> Result<CachedActions> {
        let cache = self.cache().ok_or(CacheError::CacheNotInstalled)?.clone();
        let namespace = normalize_namespace(namespace);

        if !namespace.is_empty() && !self.has_namespace(&namespace) {
            error!(namespace = %namespace, "Module namespace not found in cached_actions()");
            return Err(CacheError::NamespaceNotFound(namespace));
        }

        Ok(CachedActions::new(cache, namespace))
    }

    // == Introspection ==
    pub fn has_action(&self, action: &str) -> bool {
        self.inner.actions.contains_key(action)
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.inner.namespaces.contains(namespace)
    }

    /// Registered namespaces in sorted order.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.inner.namespaces.iter().map(String::as_str)
    }
}

impl Dispatch for Store {
    fn dispatch(&self, call: ActionCall) -> BoxFuture<'static, ActionResult> {
        Store::dispatch(self, call)
    }
}

struct StoreDispatcher {
    store: Weak<StoreInner>,
}

impl Dispatch for StoreDispatcher {
    fn dispatch(&self, call: ActionCall) -> BoxFuture<'static, ActionResult> {
        match self.store.upgrade() {
            Some(inner) => Store { inner }.dispatch(call),
            None => futures::future::ready(Err(ActionError::StoreDropped(call.action))).boxed(),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheOptions;
    use serde_json::json;

    fn echo(_ctx: ActionContext, payload: Option<Value>) -> BoxFuture<'static, ActionResult> {
        async move { Ok(payload.unwrap_or(Value::Null)) }.boxed()
    }

    #[test]
    fn test_build_registers_qualified_names() {
        let store = Store::builder()
            .handler("root", Arc::new(echo))
            .module(
                "user",
                Module::namespaced()
                    .handler("rename", Arc::new(echo))
                    .module("prefs", Module::namespaced().handler("set", Arc::new(echo)))
                    .module("plain", Module::new().handler("merged", Arc::new(echo))),
            )
            .module("global", Module::new().handler("flat", Arc::new(echo)))
            .build();

        assert!(store.has_action("root"));
        assert!(store.has_action("user/rename"));
        assert!(store.has_action("user/prefs/set"));
        assert!(store.has_action("user/merged"));
        assert!(store.has_action("flat"));
        assert_eq!(
            store.namespaces().collect::<Vec<_>>(),
            vec!["user/", "user/prefs/"]
        );
    }

    #[tokio::test]
    async fn test_dispatch_runs_handler() {
        let store = Store::builder().handler("echo", Arc::new(echo)).build();

        let value = store
            .dispatch(ActionCall::new("echo", Some(json!("hi"))))
            .await
            .unwrap();
        assert_eq!(value, json!("hi"));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_action() {
        let store = Store::builder().build();

        let err = store.dispatch(ActionCall::new("nope", None)).await.unwrap_err();
        assert_eq!(err, ActionError::UnknownAction("nope".to_string()));
    }

    #[tokio::test]
    async fn test_context_carries_module_namespace() {
        let store = Store::builder()
            .module(
                "user",
                Module::namespaced()
                    .action("whoami", |ctx, _| async move { Ok(json!(ctx.namespace())) }),
            )
            .build();

        let value = store.dispatch(ActionCall::new("user/whoami", None)).await.unwrap();
        assert_eq!(value, json!("user/"));
    }

    #[test]
    fn test_second_install_is_ignored() {
        let store = Store::builder().build();
        let first = Cache::from_arc(store.dispatcher(), CacheOptions::new());
        let second = Cache::from_arc(store.dispatcher(), CacheOptions::with_timeout(5));

        assert!(store.install_cache(first.clone()));
        assert!(!store.install_cache(second));
        assert!(store.cache().unwrap().ptr_eq(&first));
    }

    #[tokio::test]
    async fn test_dispatcher_does_not_keep_store_alive() {
        let store = Store::builder().handler("echo", Arc::new(echo)).build();
        let dispatcher = store.dispatcher();
        drop(store);

        let err = dispatcher.dispatch(ActionCall::new("echo", None)).await.unwrap_err();
        assert_eq!(err, ActionError::StoreDropped("echo".to_string()));
    }

    #[test]
    fn test_cached_actions_requires_cache() {
        let store = Store::builder().build();
        assert!(matches!(
            store.cached_actions(""),
            Err(CacheError::CacheNotInstalled)
        ));
    }

    #[test]
    fn test_cached_actions_unknown_namespace() {
        let store = Store::builder()
            .plugin(create_cache(CacheOptions::new()))
            .build();

        assert!(matches!(
            store.cached_actions("missing"),
            Err(CacheError::NamespaceNotFound(ns)) if ns == "missing/"
        ));
    }
}
