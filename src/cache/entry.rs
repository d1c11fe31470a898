//! Cache Entry Module
//!
//! Defines a memoized dispatch: the shared result handle plus its expiration.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::time::Instant;

use crate::error::ActionResult;

/// Cloneable handle to the eventual result of one dispatch.
///
/// Every clone observes the same settlement, which is what lets concurrent
/// callers share a single underlying invocation.
pub type ResultHandle = Shared<BoxFuture<'static, ActionResult>>;

// == Cache Entry ==
/// Represents a single memoized dispatch.
///
/// Entries are never mutated after insertion; an overwrite replaces the whole
/// entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Shared result of the dispatch, possibly still pending
    pub handle: ResultHandle,
    /// Identity used to match failure eviction to this exact entry
    pub id: u64,
    /// Wall-clock creation time
    pub created_at: DateTime<Utc>,
    /// Effective timeout the entry was created with, 0 = no expiration
    pub timeout_ms: u64,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry expiring `timeout_ms` from now, or never when 0.
    ///
    /// A timeout beyond what the clock can represent never expires.
    pub fn new(handle: ResultHandle, id: u64, timeout_ms: u64) -> Self {
        let expires_at = (timeout_ms > 0)
            .then(|| Instant::now().checked_add(Duration::from_millis(timeout_ms)))
            .flatten();

        Self {
            handle,
            id,
            created_at: Utc::now(),
            timeout_ms,
            expires_at,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// The entry is still live at the exact expiration instant and expired
    /// strictly after it.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => Instant::now() > expires,
            None => false,
        }
    }

    /// Inverse of [`is_expired`](Self::is_expired).
    pub fn is_live(&self) -> bool {
        !self.is_expired()
    }

    /// Returns remaining lifetime in milliseconds, or None if the entry never expires.
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at.map(|expires| {
            expires
                .saturating_duration_since(Instant::now())
                .as_millis() as u64
        })
    }

    /// Settlement state as observed through the shared handle.
    pub fn status(&self) -> EntryStatus {
        match self.handle.peek() {
            None => EntryStatus::Pending,
            Some(Ok(_)) => EntryStatus::Resolved,
            Some(Err(_)) => EntryStatus::Failed,
        }
    }

    /// Read-only description of this entry.
    pub fn view(&self) -> EntryView {
        let expires_at = self.expires_at.and_then(|_| {
            i64::try_from(self.timeout_ms)
                .ok()
                .and_then(chrono::Duration::try_milliseconds)
                .and_then(|timeout| self.created_at.checked_add_signed(timeout))
        });

        EntryView {
            status: self.status(),
            created_at: self.created_at,
            expires_at,
            ttl_remaining_ms: self.ttl_remaining_ms(),
            expired: self.is_expired(),
        }
    }
}

// == Entry Status ==
/// Settlement of a cached dispatch.
///
/// `Pending` until a caller has polled the handle to completion. Failed
/// entries are normally evicted before anyone sees them here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Resolved,
    Failed,
}

/// Serializable view of a cache entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_remaining_ms: Option<u64>,
    /// Expired but not yet observed by an access naming its key
    pub expired: bool,
}
