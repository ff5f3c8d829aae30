//! Exponential backoff

use std::time::Duration;

use rand::Rng;

use crate::RetrySettings;

/// Per-service retry counters.
///
/// The base delay for attempt `n` is `initial * multiplier^n` capped at
/// `max_delay`. It never decreases until `reset()`. Jitter is added on top when
/// a delay is handed out, bounded by `jitter_ratio` of the base delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    settings: RetrySettings,
    attempt: u32,
    current_delay: Duration,
}

impl RetryPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self {
            current_delay: Self::base_delay(&settings, 0),
            settings,
            attempt: 0,
        }
    }

    /// Capped, un-jittered delay for attempt `attempt`
    pub fn base_delay(settings: &RetrySettings, attempt: u32) -> Duration {
        let initial = settings.initial_delay_ms as f64;
        let max = settings.max_delay_ms as f64;
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let raw = initial * settings.multiplier.max(1.0).powi(exponent);
        let capped = if raw.is_finite() { raw.min(max) } else { max };
        Duration::from_millis(capped as u64)
    }

    /// Failed attempts since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Base delay before the next attempt
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn max_attempts(&self) -> u32 {
        self.settings.max_attempts
    }

    /// Upper bound of any delay returned by `next_delay`
    pub fn max_jittered_delay(&self) -> Duration {
        self.settings
            .max_delay()
            .mul_f64(1.0 + self.settings.jitter_ratio.clamp(0.0, 1.0))
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.settings.max_attempts
    }

    /// Delay to sleep before the next attempt, with jitter applied
    pub fn next_delay(&self) -> Duration {
        let ratio = self.settings.jitter_ratio.clamp(0.0, 1.0);
        if ratio == 0.0 || self.current_delay.is_zero() {
            return self.current_delay;
        }
        let max_jitter = self.current_delay.as_secs_f64() * ratio;
        let jitter = rand::thread_rng().gen_range(0.0..=max_jitter);
        self.current_delay + Duration::from_secs_f64(jitter)
    }

    /// Record a failed attempt
    pub fn advance(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
        self.current_delay = Self::base_delay(&self.settings, self.attempt);
    }

    /// Back to initial values after a successful reconnection
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_delay = Self::base_delay(&self.settings, 0);
    }
}
