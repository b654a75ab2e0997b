//! Content-addressed, TTL-bounded cache used by the marker analyzer.
//!
//! Keys are [`Fingerprint`]s derived from a source image's identity (path,
//! modification time, size), so a changed file simply stops matching its
//! old entry; there is no explicit invalidation. Entries older than the
//! [`TtlPolicy`] are reported as misses even while they still exist on disk.
//!
//! Backends:
//! - [`JsonFileCache`]: `{storage_root}/nft_cache/{fingerprint}.json`.
//! - [`MemoryCache`]: process-local map, handy for tests and short-lived tools.

mod clock;
mod error;
mod file;
mod fingerprint;
mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use clock::{Clock, ManualClock, SystemClock, TtlPolicy};
pub use error::CacheError;
pub use file::{JsonFileCache, CACHE_DIR_NAME};
pub use fingerprint::Fingerprint;
pub use memory::MemoryCache;

/// Key/value store with a TTL read policy.
///
/// `get` is an idempotent read within the TTL window and `set` is
/// write-through: a `get` right after `set` returns the stored value.
/// Concurrent writers for the same key are last-writer-wins.
pub trait Cache<K, V>: Send + Sync {
    /// Stored value, or `None` when absent, expired or unreadable.
    fn get(&self, key: &K) -> Option<V>;

    /// Store `value` under `key`, stamping it with the current time.
    fn set(&self, key: &K, value: V) -> Result<(), CacheError>;
}

/// On-disk record: the payload's fields are flattened next to the
/// fingerprint and creation time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub fingerprint: Fingerprint,
    #[serde(flatten)]
    pub payload: V,
    pub created_at: DateTime<Utc>,
}
