//! # Retry Policy Table
//!
//! Maps an event name to its retry budget. An event without a policy is
//! never retried: its first failure is terminal.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Retry budget for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `backoff_ms * n`.
    pub backoff_ms: u64,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_ms,
        }
    }

    /// Delay before retry `attempt` (1-based).
    #[must_use]
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        self.backoff_ms.saturating_mul(u64::from(attempt))
    }

    /// The relaxed policy the optimizer installs under a high error rate.
    ///
    /// One more retry (up to `retries_ceiling`) and 20% more backoff (up to
    /// `backoff_cap_ms`).
    #[must_use]
    pub fn loosened(&self, retries_ceiling: u32, backoff_cap_ms: u64) -> Self {
        // A policy already above a cap is left where it is, never lowered.
        let max_retries = self
            .max_retries
            .saturating_add(1)
            .min(retries_ceiling.max(self.max_retries));
        let scaled = (self.backoff_ms as f64 * 1.2).round() as u64;
        Self {
            max_retries,
            backoff_ms: scaled.min(backoff_cap_ms.max(self.backoff_ms)),
        }
    }
}

/// Thread-safe event → policy map.
#[derive(Debug, Default)]
pub struct RetryPolicyTable {
    policies: RwLock<HashMap<String, RetryPolicy>>,
}

impl RetryPolicyTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the policy for `event`, returning the previous one.
    pub fn set(&self, event: &str, policy: RetryPolicy) -> Option<RetryPolicy> {
        self.policies.write().insert(event.to_string(), policy)
    }

    pub fn remove(&self, event: &str) -> Option<RetryPolicy> {
        self.policies.write().remove(event)
    }

    #[must_use]
    pub fn get(&self, event: &str) -> Option<RetryPolicy> {
        self.policies.read().get(event).copied()
    }

    /// Loosen every registered policy in place. Returns how many changed.
    pub fn loosen_all(&self, retries_ceiling: u32, backoff_cap_ms: u64) -> usize {
        let mut policies = self.policies.write();
        let mut changed = 0;
        for policy in policies.values_mut() {
            let next = policy.loosened(retries_ceiling, backoff_cap_ms);
            if next != *policy {
                *policy = next;
                changed += 1;
            }
        }
        changed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }

    pub fn clear(&self) {
        self.policies.write().clear();
    }
}
