//! # Message History Ring
//!
//! A bounded, per-event log of recent deliveries. When a ring is full the
//! oldest entry is evicted, so entries stay in arrival order, newest last.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::message::{Payload, Timestamp};

/// One recorded delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub event: String,
    pub payload: Arc<Payload>,
    pub timestamp: Timestamp,
}

/// Fixed-capacity FIFO of history entries.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryRing {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        // Grows on demand past the default size; a large configured bound
        // must not be allocated per event up front.
        Self {
            entries: VecDeque::with_capacity(capacity.min(crate::HISTORY_CAPACITY)),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest one on overflow.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}

/// History rings for every event that has been dispatched.
#[derive(Debug)]
pub struct HistoryStore {
    rings: Mutex<HashMap<String, HistoryRing>>,
    capacity: usize,
}

impl HistoryStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            rings: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub fn record(&self, event: &str, payload: Arc<Payload>, timestamp: Timestamp) {
        let mut rings = self.rings.lock();
        let ring = rings
            .entry(event.to_string())
            .or_insert_with(|| HistoryRing::with_capacity(self.capacity));
        ring.push(HistoryEntry {
            event: event.to_string(),
            payload,
            timestamp,
        });
    }

    /// Entries for `event`, oldest first.
    #[must_use]
    pub fn entries(&self, event: &str) -> Vec<HistoryEntry> {
        self.rings
            .lock()
            .get(event)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of entries held per event.
    #[must_use]
    pub fn depths(&self) -> HashMap<String, usize> {
        self.rings
            .lock()
            .iter()
            .map(|(event, ring)| (event.clone(), ring.len()))
            .collect()
    }

    pub fn clear(&self) {
        self.rings.lock().clear();
    }
}
