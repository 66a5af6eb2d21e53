//! # Retry State Machine
//!
//! ```text
//! [Pending] ──fail (policy)──→ [Retrying(1)] ──fail──→ [Retrying(n+1)] ─┐
//!     │                             │                      │           │
//!     │                             └──────success─────────┴──→ [Succeeded]
//!     │                                                                │
//!     └──fail (no policy)──────────→ [Exhausted] ←──fail at n == max───┘
//! ```
//!
//! `Succeeded`, `Exhausted` and `Cancelled` are terminal: further transitions
//! are no-ops. `Cancelled` is entered when the bus is cleaned up while a
//! retry is still pending.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RetryState {
    /// Initial dispatch, not yet failed.
    Pending,
    /// Retry `n` (1-based) is scheduled or running.
    Retrying(u32),
    Succeeded,
    Exhausted,
    /// Dropped by `cleanup()` before reaching another terminal state.
    Cancelled,
}

impl RetryState {
    /// Transition after a failed attempt.
    ///
    /// `max_retries` is `None` when the event has no retry policy.
    #[must_use]
    pub fn on_failure(self, max_retries: Option<u32>) -> Self {
        match (self, max_retries) {
            (RetryState::Pending, Some(max)) if max > 0 => RetryState::Retrying(1),
            (RetryState::Pending, _) => RetryState::Exhausted,
            (RetryState::Retrying(n), Some(max)) if n < max => RetryState::Retrying(n + 1),
            (RetryState::Retrying(_), _) => RetryState::Exhausted,
            (terminal, _) => terminal,
        }
    }

    /// Transition after a successful attempt.
    #[must_use]
    pub fn on_success(self) -> Self {
        match self {
            RetryState::Pending | RetryState::Retrying(_) => RetryState::Succeeded,
            terminal => terminal,
        }
    }

    /// Transition when the pending work is discarded.
    #[must_use]
    pub fn on_cancel(self) -> Self {
        match self {
            RetryState::Pending | RetryState::Retrying(_) => RetryState::Cancelled,
            terminal => terminal,
        }
    }

    /// The retry attempt about to run, if any.
    #[must_use]
    pub fn attempt(self) -> Option<u32> {
        match self {
            RetryState::Retrying(n) => Some(n),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RetryState::Succeeded | RetryState::Exhausted | RetryState::Cancelled
        )
    }
}
