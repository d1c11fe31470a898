//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::cache::{DispatchArgs, DispatchOptions};

/// Request body naming a dispatch call (POST /dispatch, /has, /delete)
///
/// Accepts both call shapes:
/// - `{"action": "A", "payload": ..., "options": {"timeout": 100}}`
/// - `{"object": {"type": "A", ...}, "options": ...}`
///
/// An explicit `"payload": null` is a null payload, distinct from omitting it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CallRequest {
    Combined {
        object: Value,
        #[serde(default)]
        options: Option<DispatchOptions>,
    },
    Positional {
        action: String,
        #[serde(default, deserialize_with = "present")]
        payload: Option<Value>,
        #[serde(default)]
        options: Option<DispatchOptions>,
    },
}

/// Maps any present value, `null` included, to `Some`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl CallRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        match self {
            CallRequest::Positional { action, .. } if action.is_empty() => {
                Some("Action cannot be empty".to_string())
            }
            CallRequest::Combined { object, .. } if !object.is_object() => {
                Some("Combined call must be a JSON object".to_string())
            }
            CallRequest::Combined { object, .. } if !object["type"].is_string() => {
                Some("Combined call requires a string `type` field".to_string())
            }
            _ => None,
        }
    }
}

impl From<CallRequest> for DispatchArgs {
    fn from(req: CallRequest) -> Self {
        match req {
            CallRequest::Combined { object, options } => DispatchArgs::Combined { object, options },
            CallRequest::Positional {
                action,
                payload,
                options,
            } => DispatchArgs::Positional {
                action,
                payload,
                options,
            },
        }
    }
}

/// Request body for POST /clear
///
/// Without `action` every entry is removed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClearRequest {
    #[serde(default)]
    pub action: Option<String>,
}

impl ClearRequest {
    /// Parses a raw body. Only an empty body means "clear everything";
    /// anything else must be a well-formed request.
    pub fn from_body(body: &[u8]) -> Result<Self, String> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| format!("Invalid clear request: {}", e))
    }

    /// The action to clear, if any. An empty action clears everything.
    pub fn scope(&self) -> Option<&str> {
        self.action.as_deref().filter(|action| !action.is_empty())
    }
}
