//! Bus statistics snapshot returned by `stats()`.

use serde::Serialize;
use std::collections::HashMap;

use super::message::Priority;
use super::metrics::PerformanceMetric;

/// Queue depth of every tier at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueDepths {
    pub critical: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl QueueDepths {
    #[must_use]
    pub fn get(&self, priority: Priority) -> usize {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Normal => self.normal,
            Priority::Low => self.low,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.critical + self.high + self.normal + self.low
    }
}

impl From<[usize; 4]> for QueueDepths {
    /// Build from depths in `Priority::DESCENDING` order.
    fn from([critical, high, normal, low]: [usize; 4]) -> Self {
        Self {
            critical,
            high,
            normal,
            low,
        }
    }
}

/// Point-in-time view of the bus.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BusStats {
    pub channel_count: usize,
    pub subscription_count: usize,
    pub history_depth: HashMap<String, usize>,
    pub metrics: HashMap<String, PerformanceMetric>,
    pub queue_depths: QueueDepths,
}
