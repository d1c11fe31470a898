//! Key Codec Module
//!
//! Resolves the two dispatch call shapes into one canonical form and derives
//! the deterministic cache key for a call.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::cache::timeout::timeout_millis;
use crate::cache::{KEY_SEPARATOR, MAX_PAYLOAD_DEPTH};
use crate::error::{CacheError, Result};

// == Dispatch Options ==
/// Trailing options accepted by a dispatch call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOptions {
    /// Per-call expiration in milliseconds
    #[serde(
        default,
        deserialize_with = "timeout_from_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<u64>,
}

/// Reads any JSON number as whole milliseconds, the same way a combined
/// object's `timeout` field is read. Non-numbers are ignored.
fn timeout_from_number<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Value>::deserialize(deserializer).map(|value| value.as_ref().and_then(timeout_millis))
}

impl DispatchOptions {
    pub fn with_timeout(timeout_ms: u64) -> Self {
        Self {
            timeout: Some(timeout_ms),
        }
    }
}

// == Dispatch Args ==
/// Arguments of a cached dispatch call.
///
/// A call either names the action and passes the payload separately, or
/// passes a single object whose `type` field names the action. The two forms
/// produce different keys for the same action: the combined object is hashed
/// as the payload, `type` field included.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchArgs {
    /// `dispatch(action, payload?, options?)`
    Positional {
        action: String,
        payload: Option<Value>,
        options: Option<DispatchOptions>,
    },
    /// `dispatch({ type, ...fields }, options?)`
    Combined {
        object: Value,
        options: Option<DispatchOptions>,
    },
}

impl DispatchArgs {
    /// Positional call without payload.
    pub fn new(action: impl Into<String>) -> Self {
        DispatchArgs::Positional {
            action: action.into(),
            payload: None,
            options: None,
        }
    }

    /// Positional call with a payload.
    pub fn with_payload(action: impl Into<String>, payload: Value) -> Self {
        DispatchArgs::Positional {
            action: action.into(),
            payload: Some(payload),
            options: None,
        }
    }

    /// Combined-object call.
    pub fn combined(object: Value) -> Self {
        DispatchArgs::Combined {
            object,
            options: None,
        }
    }

    /// Attaches trailing options to either call shape.
    pub fn options(mut self, new_options: DispatchOptions) -> Self {
        match &mut self {
            DispatchArgs::Positional { options, .. } | DispatchArgs::Combined { options, .. } => {
                *options = Some(new_options);
            }
        }
        self
    }

    /// Shorthand for `options(DispatchOptions::with_timeout(ms))`.
    pub fn timeout(self, timeout_ms: u64) -> Self {
        self.options(DispatchOptions::with_timeout(timeout_ms))
    }

    /// The action identifier, if the call names one.
    ///
    /// Combined objects without a string `type` field have no identifier.
    pub fn action_name(&self) -> Option<&str> {
        match self {
            DispatchArgs::Positional { action, .. } => Some(action.as_str()),
            DispatchArgs::Combined { object, .. } => object.get("type").and_then(Value::as_str),
        }
    }

    /// The payload half of the key.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            DispatchArgs::Positional { payload, .. } => payload.as_ref(),
            DispatchArgs::Combined { object, .. } => Some(object),
        }
    }

    /// The call handed to the underlying dispatcher.
    pub fn to_call(&self) -> ActionCall {
        ActionCall {
            action: self.action_name().unwrap_or_default().to_string(),
            payload: self.payload().cloned(),
        }
    }
}

impl From<&str> for DispatchArgs {
    fn from(action: &str) -> Self {
        DispatchArgs::new(action)
    }
}

impl From<String> for DispatchArgs {
    fn from(action: String) -> Self {
        DispatchArgs::new(action)
    }
}

impl<S: Into<String>> From<(S, Value)> for DispatchArgs {
    fn from((action, payload): (S, Value)) -> Self {
        DispatchArgs::with_payload(action, payload)
    }
}

// == Action Call ==
/// A dispatch as seen by the host store: a fully-qualified action name and
/// the payload handed to its handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCall {
    pub action: String,
    pub payload: Option<Value>,
}

impl ActionCall {
    pub fn new(action: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            action: action.into(),
            payload,
        }
    }
}

// == Cache Key ==
/// Cache key of the form `action:serialized-payload`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Portion of the key before the first separator.
    pub fn action_part(&self) -> &str {
        self.0
            .split_once(KEY_SEPARATOR)
            .map_or(self.0.as_str(), |(action, _)| action)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

// == Derive Key ==
/// Derives the cache key for a call.
///
/// Fails when the call carries no action identifier or when the payload
/// cannot be serialized deterministically.
pub fn derive_key(args: &DispatchArgs) -> Result<CacheKey> {
    let action = args.action_name().ok_or_else(|| {
        CacheError::KeyDerivation("combined object has no string `type` field".to_string())
    })?;
    let payload = serialize_payload(args.payload())?;

    Ok(CacheKey(format!("{}{}{}", action, KEY_SEPARATOR, payload)))
}

/// Serializes the payload half of a key.
///
/// Strings pass through unquoted, an absent payload becomes `undefined`, and
/// everything else is compact JSON with integral floats written as integers.
pub fn serialize_payload(payload: Option<&Value>) -> Result<String> {
    match payload {
        None => Ok("undefined".to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(value) => {
            let depth = nesting_depth(value);
            if depth > MAX_PAYLOAD_DEPTH {
                return Err(CacheError::KeyDerivation(format!(
                    "payload nesting depth {} exceeds {}",
                    depth, MAX_PAYLOAD_DEPTH
                )));
            }
            serde_json::to_string(&normalize_numbers(value))
                .map_err(|e| CacheError::KeyDerivation(e.to_string()))
        }
    }
}

/// Largest integer a float holds exactly, `Number.MAX_SAFE_INTEGER`
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Rewrites integral floats as integers so `1.0` and `1` share a key.
///
/// Only called on values whose depth is already bounded.
fn normalize_numbers(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => Value::from(f as i64),
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(normalize_numbers).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, field)| (name.clone(), normalize_numbers(field)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// Maximum container nesting of a value, computed without recursion.
fn nesting_depth(value: &Value) -> usize {
    let mut max_depth = 0;
    let mut stack = vec![(value, 0usize)];

    while let Some((value, depth)) = stack.pop() {
        match value {
            Value::Array(items) => {
                max_depth = max_depth.max(depth + 1);
                stack.extend(items.iter().map(|item| (item, depth + 1)));
            }
            Value::Object(fields) => {
                max_depth = max_depth.max(depth + 1);
                stack.extend(fields.values().map(|field| (field, depth + 1)));
            }
            _ => {}
        }
    }

    max_depth
}
