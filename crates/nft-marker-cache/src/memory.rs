use crate::{Cache, CacheError, Clock, SystemClock, TtlPolicy};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

/// Process-local cache with the same TTL semantics as the file store.
pub struct MemoryCache<K, V> {
    entries: Mutex<HashMap<K, (V, DateTime<Utc>)>>,
    policy: TtlPolicy,
    clock: Arc<dyn Clock>,
}

impl<K, V> Default for MemoryCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            policy: TtlPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl<K, V> MemoryCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, policy: TtlPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, (_, created)| !self.policy.is_expired(*created, now));
        before - entries.len()
    }
}

impl<K, V> Cache<K, V> for MemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let (value, created) = entries.get(key)?;
        (!self.policy.is_expired(*created, now)).then(|| value.clone())
    }

    fn set(&self, key: &K, value: V) -> Result<(), CacheError> {
        let now = self.clock.now();
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), (value, now));
        Ok(())
    }
}
