//! Circuit breaker
//!
//! ```text
//!            failures >= threshold
//!   Closed ──────────────────────────▶ Open
//!     ▲                                 │ timeout elapsed, next attempt
//!     │ success                         ▼
//!     └──────────────────────────── HalfOpen
//!                                       │ failure
//!                                       └──────▶ Open
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::BreakerSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure: None,
        }
    }

    /// Stored state, without applying the timeout
    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Effective state at `now`: an Open breaker whose cooldown elapsed reads
    /// as HalfOpen.
    pub fn state_at(&self, now: Instant) -> BreakerState {
        match self.state {
            BreakerState::Open if self.remaining_cooldown(now).is_none() => BreakerState::HalfOpen,
            state => state,
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    /// Time left before an Open breaker admits a trial attempt
    pub fn remaining_cooldown(&self, now: Instant) -> Option<Duration> {
        if self.state != BreakerState::Open {
            return None;
        }
        let last = self.last_failure?;
        let elapsed = now.saturating_duration_since(last);
        self.settings.timeout().checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    /// Ask to make an attempt at `now`.
    ///
    /// An Open breaker past its cooldown moves to HalfOpen and admits the
    /// attempt; otherwise `Err` carries the remaining cooldown.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        if self.state == BreakerState::Open {
            match self.remaining_cooldown(now) {
                Some(remaining) => return Err(remaining),
                None => self.state = BreakerState::HalfOpen,
            }
        }
        Ok(())
    }

    /// Record a failed attempt. Returns true if this call opened the breaker.
    pub fn record_failure(&mut self, now: Instant) -> bool {
        match self.state {
            BreakerState::HalfOpen => {
                self.failure_count = self.failure_count.saturating_add(1);
                self.last_failure = Some(now);
                self.state = BreakerState::Open;
                true
            }
            BreakerState::Open => {
                self.failure_count = self.failure_count.saturating_add(1);
                self.last_failure = Some(now);
                false
            }
            BreakerState::Closed => {
                // Failures older than the window no longer count
                if let Some(last) = self.last_failure {
                    if now.saturating_duration_since(last) >= self.settings.timeout() {
                        self.failure_count = 0;
                    }
                }
                self.failure_count = self.failure_count.saturating_add(1);
                self.last_failure = Some(now);
                if self.failure_count >= self.settings.failure_threshold {
                    self.state = BreakerState::Open;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful attempt: clears the failure count and closes a
    /// HalfOpen breaker. Open ignores successes until its trial.
    pub fn record_success(&mut self) {
        if self.state != BreakerState::Open {
            self.reset();
        }
    }

    /// Force Closed (manual reconnect)
    pub fn reset(&mut self) {
        self.state = BreakerState::Closed;
        self.failure_count = 0;
        self.last_failure = None;
    }
}
