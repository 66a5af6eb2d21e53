//! # Performance Metrics Store
//!
//! Per-event counters updated after every dispatch attempt. The counters are
//! atomics so recording never takes a write lock once an event is known;
//! the map itself is only write-locked to add a new event.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Snapshot of one event's counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub event: String,
    pub total_messages: u64,
    pub avg_latency_ms: f64,
    pub errors: u64,
}

/// Metrics aggregated across all events, as seen by the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalMetrics {
    pub total_messages: u64,
    pub errors: u64,
    pub avg_latency_ms: f64,
}

impl GlobalMetrics {
    /// Fraction of dispatch attempts that failed; zero when nothing ran.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        if self.total_messages == 0 {
            0.0
        } else {
            self.errors as f64 / self.total_messages as f64
        }
    }
}

#[derive(Debug, Default)]
struct EventCounters {
    total: AtomicU64,
    errors: AtomicU64,
    latency_ms_sum: AtomicU64,
}

impl EventCounters {
    fn snapshot(&self, event: &str) -> PerformanceMetric {
        let total = self.total.load(Ordering::Relaxed);
        let latency = self.latency_ms_sum.load(Ordering::Relaxed);
        PerformanceMetric {
            event: event.to_string(),
            total_messages: total,
            avg_latency_ms: if total == 0 {
                0.0
            } else {
                latency as f64 / total as f64
            },
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Thread-safe metrics store.
#[derive(Debug, Default)]
pub struct MetricsStore {
    events: RwLock<HashMap<String, Arc<EventCounters>>>,
}

impl MetricsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, event: &str) -> Arc<EventCounters> {
        if let Some(counters) = self.events.read().get(event) {
            return Arc::clone(counters);
        }
        Arc::clone(self.events.write().entry(event.to_string()).or_default())
    }

    /// Record one dispatch attempt.
    pub fn record(&self, event: &str, latency_ms: u64, failed: bool) {
        let counters = self.counters(event);
        counters.total.fetch_add(1, Ordering::Relaxed);
        counters.latency_ms_sum.fetch_add(latency_ms, Ordering::Relaxed);
        if failed {
            counters.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn get(&self, event: &str) -> Option<PerformanceMetric> {
        self.events
            .read()
            .get(event)
            .map(|counters| counters.snapshot(event))
    }

    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, PerformanceMetric> {
        self.events
            .read()
            .iter()
            .map(|(event, counters)| (event.clone(), counters.snapshot(event)))
            .collect()
    }

    /// Aggregate across events. The average latency is weighted by message
    /// count, not averaged per event.
    #[must_use]
    pub fn aggregate(&self) -> GlobalMetrics {
        let events = self.events.read();
        let mut total = 0u64;
        let mut errors = 0u64;
        let mut latency = 0u64;
        for counters in events.values() {
            total += counters.total.load(Ordering::Relaxed);
            errors += counters.errors.load(Ordering::Relaxed);
            latency += counters.latency_ms_sum.load(Ordering::Relaxed);
        }
        GlobalMetrics {
            total_messages: total,
            errors,
            avg_latency_ms: if total == 0 {
                0.0
            } else {
                latency as f64 / total as f64
            },
        }
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}
