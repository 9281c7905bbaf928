//! Reconnection Policy
//!
//! Exponential backoff with jitter for WebSocket reconnection. Sessions ask
//! the policy for the next delay after every failed connection and reset it
//! once a connection is established.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::ReconnectSettings;

/// Jitter applied to every delay, as a fraction of the base delay.
const JITTER_FACTOR: f64 = 0.1;

/// Reconnection policy for one exchange session.
#[derive(Debug)]
pub struct ReconnectPolicy {
    settings: ReconnectSettings,
    current_delay: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Create a policy from the configured reconnect settings.
    #[must_use]
    pub fn new(settings: ReconnectSettings) -> Self {
        let current_delay = settings.delay_initial;
        Self {
            settings,
            current_delay,
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt, or `None` once the attempt
    /// budget is spent (`max_attempts` of 0 means unlimited).
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.settings.max_attempts > 0 && self.attempts >= self.settings.max_attempts {
            return None;
        }
        self.attempts += 1;

        let delay = jittered(self.current_delay);

        let scaled_ms = duration_ms(self.current_delay) * self.settings.delay_multiplier;
        let capped_ms = scaled_ms.min(duration_ms(self.settings.delay_max));
        self.current_delay = ms_to_duration(capped_ms);

        Some(delay)
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.current_delay = self.settings.delay_initial;
        self.attempts = 0;
    }

    /// Attempts consumed since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}

fn jittered(base: Duration) -> Duration {
    let base_ms = duration_ms(base);
    if base_ms <= 0.0 {
        return base;
    }
    let spread = base_ms * JITTER_FACTOR;
    let offset: f64 = rand::rng().random_range(-spread..=spread);
    ms_to_duration((base_ms + offset).max(1.0))
}

#[allow(clippy::cast_precision_loss)]
fn duration_ms(d: Duration) -> f64 {
    d.as_millis() as f64
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn ms_to_duration(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_millis(ms.round() as u64)
    } else {
        Duration::from_millis(0)
    }
}

// =============================================================================
// Tests
// =============================================================================
