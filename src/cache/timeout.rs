//! Timeout Resolver
//!
//! Picks the expiration applied to a newly created cache entry.

use serde_json::Value;

use crate::cache::DispatchArgs;
use crate::config::CacheOptions;

/// Resolves the effective expiration in milliseconds, 0 meaning never.
///
/// A combined object's own numeric `timeout` field, or a positional call's
/// `options.timeout`, wins over the plugin-level default. Only consulted when
/// a new entry is created; a live entry keeps the expiration it was created
/// with.
pub fn resolve_timeout(args: &DispatchArgs, options: &CacheOptions) -> u64 {
    call_timeout(args).or(options.timeout).unwrap_or(0)
}

fn call_timeout(args: &DispatchArgs) -> Option<u64> {
    match args {
        DispatchArgs::Combined { object, .. } => object.get("timeout").and_then(timeout_millis),
        DispatchArgs::Positional { options, .. } => options.as_ref().and_then(|o| o.timeout),
    }
}

/// Whole milliseconds from a JSON number. Negative values clamp to 0.
pub(crate) fn timeout_millis(value: &Value) -> Option<u64> {
    if let Some(ms) = value.as_u64() {
        return Some(ms);
    }
    value.as_f64().map(|ms| if ms > 0.0 { ms as u64 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_sources_never_expires() {
        assert_eq!(resolve_timeout(&DispatchArgs::new("A"), &CacheOptions::new()), 0);
    }

    #[test]
    fn test_plugin_default_applies() {
        let options = CacheOptions::with_timeout(100);
        assert_eq!(resolve_timeout(&DispatchArgs::new("A"), &options), 100);
        assert_eq!(
            resolve_timeout(&DispatchArgs::combined(json!({"type": "A"})), &options),
            100
        );
    }

    #[test]
    fn test_options_argument_overrides_default() {
        let options = CacheOptions::with_timeout(100);
        let args = DispatchArgs::with_payload("A", json!(null)).timeout(200);
        assert_eq!(resolve_timeout(&args, &options), 200);
    }

    #[test]
    fn test_combined_object_overrides_default() {
        let options = CacheOptions::with_timeout(100);
        let args = DispatchArgs::combined(json!({"type": "A", "timeout": 300}));
        assert_eq!(resolve_timeout(&args, &options), 300);
    }

    #[test]
    fn test_combined_form_ignores_trailing_options() {
        let args = DispatchArgs::combined(json!({"type": "A"})).timeout(500);
        assert_eq!(resolve_timeout(&args, &CacheOptions::new()), 0);
    }

    #[test]
    fn test_non_numeric_timeout_is_ignored() {
        let options = CacheOptions::with_timeout(100);
        let args = DispatchArgs::combined(json!({"type": "A", "timeout": "50"}));
        assert_eq!(resolve_timeout(&args, &options), 100);
    }

    #[test]
    fn test_zero_or_negative_call_timeout_still_wins() {
        let options = CacheOptions::with_timeout(100);
        let zero = DispatchArgs::new("A").timeout(0);
        let negative = DispatchArgs::combined(json!({"type": "A", "timeout": -5}));
        assert_eq!(resolve_timeout(&zero, &options), 0);
        assert_eq!(resolve_timeout(&negative, &options), 0);
    }

    #[test]
    fn test_both_call_forms_read_numbers_alike() {
        let options = CacheOptions::with_timeout(100);

        for raw in [json!(-5), json!(150.5), json!(42), json!("50")] {
            let positional = DispatchArgs::Positional {
                action: "A".to_string(),
                payload: None,
                options: serde_json::from_value(json!({ "timeout": raw })).unwrap(),
            };
            let combined = DispatchArgs::combined(json!({"type": "A", "timeout": raw}));

            assert_eq!(
                resolve_timeout(&positional, &options),
                resolve_timeout(&combined, &options),
                "timeout {}",
                raw
            );
        }
    }

    #[test]
    fn test_fractional_timeout_truncates() {
        let args = DispatchArgs::combined(json!({"type": "A", "timeout": 150.7}));
        assert_eq!(resolve_timeout(&args, &CacheOptions::new()), 150);
    }
}
