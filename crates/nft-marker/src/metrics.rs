//! Counters exposed to an external monitoring collaborator.

use std::collections::BTreeMap;
use std::sync::Mutex;

pub const GENERATION_COUNT: &str = "nft.generation.count";
pub const GENERATION_FAILED: &str = "nft.generation.failed";
/// Accumulated wall time of successful generations, in milliseconds.
pub const GENERATION_TIME_MS: &str = "nft.generation.time_ms";
pub const CACHE_HIT: &str = "nft.cache.hit";
pub const CACHE_MISS: &str = "nft.cache.miss";

/// Sink for monotonically increasing counters.
pub trait MetricsSink: Send + Sync {
    fn add(&self, name: &'static str, value: u64);

    fn increment(&self, name: &'static str) {
        self.add(name, 1);
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn add(&self, _name: &'static str, _value: u64) {}
}

/// Thread-safe in-process counters.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    counters: Mutex<BTreeMap<&'static str, u64>>,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value; unknown counters read as zero.
    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .map(|m| m.get(name).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Copy of all counters, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        self.counters
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl MetricsSink for CounterMetrics {
    fn add(&self, name: &'static str, value: u64) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let slot = counters.entry(name).or_insert(0);
        *slot = slot.saturating_add(value);
    }
}
