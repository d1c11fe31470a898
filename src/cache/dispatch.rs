//! Dispatch Interceptor
//!
//! Memoizes calls to an underlying dispatcher. The first call for a key
//! invokes the action and installs its shared result handle before returning;
//! every later call for that key joins the same handle until it expires, is
//! deleted or cleared, or the action fails.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cache::{
    derive_key, resolve_timeout, ActionCall, CacheKey, CacheState, CacheStats, CacheStore,
    DispatchArgs, ResultHandle,
};
use crate::config::CacheOptions;
use crate::error::{ActionError, ActionResult};

// == Dispatch Capability ==
/// The host store's dispatch operation.
///
/// Invoked at most once per cache miss. The returned future must not borrow
/// the dispatcher; it is driven to completion on the Tokio runtime whether or
/// not anyone awaits the result.
pub trait Dispatch: Send + Sync + 'static {
    fn dispatch(&self, call: ActionCall) -> BoxFuture<'static, ActionResult>;
}

impl<F> Dispatch for F
where
    F: Fn(ActionCall) -> BoxFuture<'static, ActionResult> + Send + Sync + 'static,
{
    fn dispatch(&self, call: ActionCall) -> BoxFuture<'static, ActionResult> {
        self(call)
    }
}

// == Cache ==
/// Cached dispatch over a [`Dispatch`] implementation.
///
/// Cloning yields another handle to the same cache instance. Independent
/// caches never share entries.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    store: Arc<Mutex<CacheStore>>,
    dispatcher: Arc<dyn Dispatch>,
    options: CacheOptions,
}

impl Cache {
    // == Constructor ==
    pub fn new(dispatcher: impl Dispatch, options: CacheOptions) -> Self {
        Self::from_arc(Arc::new(dispatcher), options)
    }

    pub fn from_arc(dispatcher: Arc<dyn Dispatch>, options: CacheOptions) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store: Arc::new(Mutex::new(CacheStore::new())),
                dispatcher,
                options,
            }),
        }
    }

    /// Plugin-level options this cache was created with.
    pub fn options(&self) -> &CacheOptions {
        &self.inner.options
    }

    /// True if both handles refer to the same cache instance.
    pub fn ptr_eq(&self, other: &Cache) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // == Dispatch ==
    /// Dispatches an action, or joins the live cached dispatch for the same key.
    ///
    /// The entry is installed before this returns, so a second call racing
    /// the first one's settlement shares its handle. When no key can be
    /// derived the call passes straight through to the dispatcher, uncached.
    ///
    /// Outside a Tokio runtime nothing is dispatched or cached and the handle
    /// settles with [`ActionError::Aborted`].
    pub fn dispatch(&self, args: impl Into<DispatchArgs>) -> ResultHandle {
        let args = args.into();

        let Ok(runtime) = Handle::try_current() else {
            warn!("Dispatch called outside a Tokio runtime");
            let err = ActionError::Aborted("no Tokio runtime to drive the dispatch".to_string());
            return futures::future::ready::<ActionResult>(Err(err)).boxed().shared();
        };

        let key = match derive_key(&args) {
            Ok(key) => key,
            Err(err) => {
                warn!(error = %err, "Dispatching without cache");
                self.inner.store.lock().record_bypass();
                let (tx, handle) = pending_handle();
                self.settle_in_background(&runtime, self.invoke(args.to_call()), tx, None);
                return handle;
            }
        };

        let (tx, handle, id) = {
            let mut store = self.inner.store.lock();

            if let Some(handle) = store.live_handle(&key) {
                store.record_hit();
                debug!(key = %key, "Cache hit");
                return handle;
            }

            store.record_miss();
            let timeout_ms = resolve_timeout(&args, &self.inner.options);
            let (tx, handle) = pending_handle();
            let id = store.put(key.clone(), handle.clone(), timeout_ms);
            debug!(key = %key, timeout_ms, "Cache miss, dispatching");

            (tx, handle, id)
        };

        // The lock is released so handlers may use this cache while being invoked.
        self.settle_in_background(&runtime, self.invoke(args.to_call()), tx, Some((key, id)));
        handle
    }

    // == Has ==
    /// True iff a live entry exists for the call's key.
    pub fn has(&self, args: impl Into<DispatchArgs>) -> bool {
        match derive_key(&args.into()) {
            Ok(key) => self.inner.store.lock().contains_live(&key),
            Err(_) => false,
        }
    }

    // == Delete ==
    /// Removes the entry for the call's key. Returns true if one existed.
    pub fn delete(&self, args: impl Into<DispatchArgs>) -> bool {
        match derive_key(&args.into()) {
            Ok(key) => self.inner.store.lock().delete(&key),
            Err(_) => false,
        }
    }

    // == Clear ==
    /// Removes every entry.
    pub fn clear(&self) -> bool {
        self.inner.store.lock().clear()
    }

    /// Removes every entry dispatched under `action`. Returns the count removed.
    pub fn clear_action(&self, action: &str) -> usize {
        let removed = self.inner.store.lock().clear_action(action);
        debug!(action, removed, "Cleared action from cache");
        removed
    }

    // == State ==
    /// Snapshot of the current entries.
    pub fn state(&self) -> CacheState {
        self.inner.store.lock().snapshot()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.store.lock().stats()
    }

    /// Calls the dispatcher, turning a panic during the call into a failed result.
    fn invoke(&self, call: ActionCall) -> BoxFuture<'static, ActionResult> {
        let action = call.action.clone();
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.inner.dispatcher.dispatch(call))) {
            Ok(future) => future,
            Err(panic) => {
                let err = ActionError::Aborted(format!("{}: {}", action, panic_message(&*panic)));
                futures::future::ready(Err(err)).boxed()
            }
        }
    }

    /// Drives `action` on the runtime and publishes its result to `tx`.
    ///
    /// A failure evicts entry `(key, id)` before the result is published, so
    /// anyone observing the rejection already sees the key as absent.
    fn settle_in_background(
        &self,
        runtime: &Handle,
        action: BoxFuture<'static, ActionResult>,
        tx: oneshot::Sender<ActionResult>,
        entry: Option<(CacheKey, u64)>,
    ) {
        let store = Arc::clone(&self.inner.store);

        runtime.spawn(async move {
            let result = match AssertUnwindSafe(action).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(ActionError::Aborted(panic_message(&*panic))),
            };

            if let (Err(err), Some((key, id))) = (&result, &entry) {
                if store.lock().evict_failed(key, *id) {
                    debug!(key = %key, error = %err, "Evicted failed dispatch");
                }
            }

            // Nobody may be awaiting anymore
            let _ = tx.send(result);
        });
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("options", &self.inner.options)
            .field("entries", &self.inner.store.lock().len())
            .finish()
    }
}

/// A handle that settles with whatever is sent on the returned sender.
fn pending_handle() -> (oneshot::Sender<ActionResult>, ResultHandle) {
    let (tx, rx) = oneshot::channel();
    let handle = rx
        .map(|received| {
            received.unwrap_or_else(|_| Err(ActionError::Aborted("dispatch dropped".to_string())))
        })
        .boxed()
        .shared();
    (tx, handle)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Dispatcher that counts invocations and answers with the count.
    fn counting() -> (Arc<AtomicUsize>, impl Dispatch) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let dispatcher = move |_call: ActionCall| -> BoxFuture<'static, ActionResult> {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(json!(n)) }.boxed()
        };
        (calls, dispatcher)
    }

    fn failing() -> (Arc<AtomicUsize>, impl Dispatch) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let dispatcher = move |_call: ActionCall| -> BoxFuture<'static, ActionResult> {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(ActionError::failed("An unknown error.")) }.boxed()
        };
        (calls, dispatcher)
    }

    fn deep_payload() -> Value {
        let mut value = json!({});
        for _ in 0..=crate::cache::MAX_PAYLOAD_DEPTH {
            value = json!({ "a": value });
        }
        value
    }

    #[tokio::test]
    async fn test_second_dispatch_is_served_from_cache() {
        let (calls, dispatcher) = counting();
        let cache = Cache::new(dispatcher, CacheOptions::new());

        assert_eq!(cache.dispatch("A").await.unwrap(), json!(1));
        assert_eq!(cache.dispatch("A").await.unwrap(), json!(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_entry_installed_before_settlement() {
        let (calls, dispatcher) = counting();
        let cache = Cache::new(dispatcher, CacheOptions::new());

        let first = cache.dispatch("A");
        assert!(cache.has("A"));
        let second = cache.dispatch("A");

        assert_eq!(first.await.unwrap(), second.await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_evicts_and_propagates() {
        let (calls, dispatcher) = failing();
        let cache = Cache::new(dispatcher, CacheOptions::new());

        let handle = cache.dispatch("A");
        assert!(cache.has("A"));

        let err = handle.await.unwrap_err();
        assert_eq!(err, ActionError::failed("An unknown error."));
        assert!(!cache.has("A"));

        let _ = cache.dispatch("A").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().failures, 2);
    }

    #[tokio::test]
    async fn test_failure_evicts_without_awaiting() {
        let (_calls, dispatcher) = failing();
        let cache = Cache::new(dispatcher, CacheOptions::new());

        drop(cache.dispatch("A"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!cache.has("A"));
    }

    #[tokio::test]
    async fn test_stale_failure_keeps_newer_entry() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let waiter = Arc::clone(&gate);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let dispatcher = move |_call: ActionCall| -> BoxFuture<'static, ActionResult> {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let waiter = Arc::clone(&waiter);
            async move {
                if n == 0 {
                    waiter.notified().await;
                    Err(ActionError::failed("late failure"))
                } else {
                    Ok(json!("fresh"))
                }
            }
            .boxed()
        };
        let cache = Cache::new(dispatcher, CacheOptions::new());

        let stale = cache.dispatch("A");
        assert!(cache.clear());
        assert_eq!(cache.dispatch("A").await.unwrap(), json!("fresh"));

        gate.notify_one();
        assert!(stale.await.is_err());
        assert!(cache.has("A"));
    }

    #[tokio::test]
    async fn test_panicking_action_is_aborted_and_evicted() {
        async fn explode() -> ActionResult {
            panic!("handler exploded")
        }
        let dispatcher = |_call: ActionCall| -> BoxFuture<'static, ActionResult> { explode().boxed() };
        let cache = Cache::new(dispatcher, CacheOptions::new());

        let err = cache.dispatch("A").await.unwrap_err();
        assert_eq!(err, ActionError::Aborted("handler exploded".to_string()));
        assert!(!cache.has("A"));
    }

    #[tokio::test]
    async fn test_panicking_dispatcher_call_is_aborted() {
        let dispatcher = |_call: ActionCall| -> BoxFuture<'static, ActionResult> {
            panic!("no such store")
        };
        let cache = Cache::new(dispatcher, CacheOptions::new());

        let err = cache.dispatch("A").await.unwrap_err();
        assert!(matches!(err, ActionError::Aborted(message) if message.contains("no such store")));
        assert!(!cache.has("A"));
    }

    #[tokio::test]
    async fn test_unserializable_payload_falls_back_to_passthrough() {
        let (calls, dispatcher) = counting();
        let cache = Cache::new(dispatcher, CacheOptions::new());
        let payload = deep_payload();

        cache.dispatch(("A", payload.clone())).await.unwrap();
        cache.dispatch(("A", payload.clone())).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.has(("A", payload.clone())));
        assert!(!cache.delete(("A", payload)));
        assert!(cache.state().is_empty());
        assert_eq!(cache.stats().bypasses, 2);
    }

    #[tokio::test]
    async fn test_passthrough_receives_original_call() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let dispatcher = move |call: ActionCall| -> BoxFuture<'static, ActionResult> {
            recorder.lock().push(call);
            async { Ok(Value::Null) }.boxed()
        };
        let cache = Cache::new(dispatcher, CacheOptions::new());

        let object = json!({"name": "no type"});
        cache.dispatch(DispatchArgs::combined(object.clone())).await.unwrap();

        assert_eq!(seen.lock()[0], ActionCall::new("", Some(object)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_redispatched() {
        let (calls, dispatcher) = counting();
        let cache = Cache::new(dispatcher, CacheOptions::with_timeout(100));

        cache.dispatch("A").await.unwrap();
        tokio::time::advance(Duration::from_millis(99)).await;
        assert!(cache.has("A"));
        cache.dispatch("A").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(!cache.has("A"));
        assert_eq!(cache.dispatch("A").await.unwrap(), json!(2));
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_entry_keeps_original_expiration() {
        let (calls, dispatcher) = counting();
        let cache = Cache::new(dispatcher, CacheOptions::new());

        cache.dispatch(DispatchArgs::new("A").timeout(100)).await.unwrap();
        tokio::time::advance(Duration::from_millis(50)).await;
        cache.dispatch(DispatchArgs::new("A").timeout(10_000)).await.unwrap();

        tokio::time::advance(Duration::from_millis(51)).await;
        assert!(!cache.has("A"));
        cache.dispatch("A").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_action_and_state() {
        let (_calls, dispatcher) = counting();
        let cache = Cache::new(dispatcher, CacheOptions::new());

        cache.dispatch("A");
        cache.dispatch(("B", json!({"name": "one"})));
        cache.dispatch(("B", json!({"name": "two"})));
        assert_eq!(cache.state().len(), 3);

        assert_eq!(cache.clear_action("B"), 2);
        assert!(cache.has("A"));
        assert_eq!(cache.state().keys().collect::<Vec<_>>(), vec!["A:undefined"]);
    }

    #[test]
    fn test_dispatch_outside_runtime_is_aborted() {
        let (calls, dispatcher) = counting();
        let cache = Cache::new(dispatcher, CacheOptions::new());

        let result = futures::executor::block_on(cache.dispatch("A"));

        assert!(matches!(result, Err(ActionError::Aborted(_))));
        assert!(!cache.has("A"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_independent_caches_do_not_share_entries() {
        let (_a_calls, a) = counting();
        let (_b_calls, b) = counting();
        let first = Cache::new(a, CacheOptions::new());
        let second = Cache::new(b, CacheOptions::new());

        first.dispatch("A").await.unwrap();

        assert!(first.has("A"));
        assert!(!second.has("A"));
        assert!(first.ptr_eq(&first.clone()));
        assert!(!first.ptr_eq(&second));
    }
}
