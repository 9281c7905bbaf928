//! Rate Gate
//!
//! Per-key admission control: at most one admitted event per window per
//! subscription key. Used to collapse the per-tick registry update path
//! (expensive) down to one write per key per window while leaving the
//! per-tick store write path untouched.
//!
//! The gate is deliberately best-effort. Missing an admission is harmless
//! and a duplicate admission within the window is merely wasteful, so a
//! coarse lock over the whole map is enough - admission work is O(1).

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::ticker::SubscriptionKey;

/// Per-key admission gate with a fixed wall-clock window.
#[derive(Debug)]
pub struct RateGate {
    window: chrono::Duration,
    last_admitted: Mutex<HashMap<SubscriptionKey, DateTime<Utc>>>,
}

impl RateGate {
    /// Create a gate with the given admission window.
    ///
    /// Windows larger than what `chrono` can represent are clamped to the
    /// maximum representable duration.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        Self {
            window,
            last_admitted: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject an event for `key` at wall-clock time `now`.
    ///
    /// Admits iff the key has never been admitted, or at least one window
    /// has elapsed since its last admission. On admission, `now` becomes the
    /// key's new last-admission time. A clock that steps backwards
    /// (`now` before the recorded time) reads as zero elapsed: the event is
    /// rejected and the recorded time is left in place.
    ///
    /// Never suspends; safe to call from concurrent callbacks.
    pub fn admit(&self, key: &SubscriptionKey, now: DateTime<Utc>) -> bool {
        let mut last = self.last_admitted.lock();
        match last.get(key) {
            Some(&prev) => {
                let elapsed = now.signed_duration_since(prev);
                if elapsed < chrono::Duration::zero() || elapsed < self.window {
                    return false;
                }
                last.insert(key.clone(), now);
                true
            }
            None => {
                last.insert(key.clone(), now);
                true
            }
        }
    }

    /// Forget all admission times (collector teardown).
    pub fn reset(&self) {
        self.last_admitted.lock().clear();
    }

    /// Number of keys with a recorded admission.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.last_admitted.lock().len()
    }
}

// =============================================================================
// Tests
// =============================================================================
