//! Demo Store
//!
//! Actions served by the binary so the cache can be exercised over HTTP.
//! Every result carries the invocation counter of its action, which makes
//! cache hits visible to clients.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::Ready;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::{ActionError, ActionResult};
use crate::store::{create_cache, ActionContext, Module, Store};

/// Builds the demo store with a cache installed from `config`.
///
/// # Actions
/// - `echo` - Returns its payload
/// - `fail` - Rejects with the payload as message
/// - `clock/now` - Returns the current time
/// - `slow/echo` - Returns its payload after `demo_latency_ms`
pub fn demo_store(config: &Config) -> Store {
    let latency = Duration::from_millis(config.demo_latency_ms);

    Store::builder()
        .action("echo", counted(|payload| Ok(payload.unwrap_or(Value::Null))))
        .action("fail", |_ctx: ActionContext, payload: Option<Value>| async move {
            let message = payload
                .as_ref()
                .and_then(Value::as_str)
                .unwrap_or("requested failure")
                .to_string();
            Err(ActionError::Failed(message))
        })
        .module(
            "clock",
            Module::namespaced().action(
                "now",
                counted(|_| Ok(json!(Utc::now().to_rfc3339()))),
            ),
        )
        .module(
            "slow",
            Module::namespaced().action("echo", {
                let echo = counted(|payload| Ok(payload.unwrap_or(Value::Null)));
                move |ctx: ActionContext, payload: Option<Value>| {
                    let result = echo(ctx, payload);
                    async move {
                        tokio::time::sleep(latency).await;
                        result.await
                    }
                }
            }),
        )
        .plugin(create_cache(config.cache_options()))
        .build()
}

/// Wraps a synchronous action body with a per-action invocation counter.
fn counted<F>(
    body: F,
) -> impl Fn(ActionContext, Option<Value>) -> Ready<ActionResult> + Send + Sync + 'static
where
    F: Fn(Option<Value>) -> ActionResult + Send + Sync + 'static,
{
    let invocations = Arc::new(AtomicU64::new(0));
    move |_ctx: ActionContext, payload: Option<Value>| {
        let invocation = invocations.fetch_add(1, Ordering::SeqCst) + 1;
        let result = body(payload).map(|value| json!({ "value": value, "invocation": invocation }));
        futures::future::ready(result)
    }
}
