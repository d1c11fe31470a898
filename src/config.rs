//! Configuration Module
//!
//! Plugin-level cache options plus the server configuration loaded from
//! environment variables.

use std::env;

use serde::{Deserialize, Serialize};

// == Cache Options ==
/// Options supplied when a cache is created.
///
/// `timeout` is the plugin-level default expiration in milliseconds. It only
/// applies to dispatch calls that carry no timeout of their own; `None` means
/// entries never expire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Default expiration in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl CacheOptions {
    /// Options with no default expiration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with a default expiration of `timeout_ms` milliseconds.
    pub fn with_timeout(timeout_ms: u64) -> Self {
        Self {
            timeout: Some(timeout_ms),
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Default cache expiration in milliseconds, None = never expire
    pub cache_timeout_ms: Option<u64>,
    /// Artificial latency of the demo `slow/*` actions in milliseconds
    pub demo_latency_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_TIMEOUT_MS` - Default cache expiration (default: unset, never expire)
    /// - `DEMO_LATENCY_MS` - Latency of the demo slow actions (default: 50)
    pub fn from_env() -> Self {
        Self {
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            cache_timeout_ms: env::var("CACHE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|ms| *ms > 0),
            demo_latency_ms: env::var("DEMO_LATENCY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
        }
    }

    /// Plugin options derived from this configuration.
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            timeout: self.cache_timeout_ms,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cache_timeout_ms: None,
            demo_latency_ms: 50,
        }
    }
}
