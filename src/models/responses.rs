//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheStats;

/// Response body for POST /dispatch
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResponse {
    /// Cache key of the call, absent when the call bypassed the cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Whether the result came from an entry that already existed
    pub cached: bool,
    /// Result of the action
    pub value: Value,
}

/// Response body for POST /has
#[derive(Debug, Clone, Serialize)]
pub struct HasResponse {
    pub cached: bool,
}

/// Response body for POST /delete
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// Response body for POST /clear
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    /// True when every entry was removed
    pub cleared: bool,
    /// Number of entries removed by a scoped clear
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
}

impl ClearResponse {
    pub fn all() -> Self {
        Self {
            cleared: true,
            removed: None,
        }
    }

    pub fn scoped(removed: usize) -> Self {
        Self {
            cleared: false,
            removed: Some(removed),
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of uncached passthrough dispatches
    pub bypasses: u64,
    /// Number of expired entries removed on access
    pub expirations: u64,
    /// Number of entries evicted after a failed dispatch
    pub failures: u64,
    /// Current number of entries in cache
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            bypasses: stats.bypasses,
            expirations: stats.expirations,
            failures: stats.failures,
            total_entries: stats.total_entries,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
