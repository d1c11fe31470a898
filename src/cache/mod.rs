//! Cache Module
//!
//! Memoized action dispatch: key derivation, timeout resolution, the entry
//! map and the dispatch interceptor built on top of them.

mod dispatch;
mod entry;
mod key;
mod stats;
mod store;
mod timeout;


// Re-export public types
pub use dispatch::{Cache, Dispatch};
pub use entry::{CacheEntry, EntryStatus, EntryView, ResultHandle};
pub use key::{derive_key, serialize_payload, ActionCall, CacheKey, DispatchArgs, DispatchOptions};
pub use stats::CacheStats;
pub use store::{CacheState, CacheStore};
pub use timeout::resolve_timeout;

// == Public Constants ==
/// Separator between the action identifier and the serialized payload in a key
pub const KEY_SEPARATOR: char = ':';

/// Deepest payload nesting that still yields a cache key
pub const MAX_PAYLOAD_DEPTH: usize = 128;
