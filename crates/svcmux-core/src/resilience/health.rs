//! Health state machine
//!
//! Feeds probe outcomes into a `HealthState`. Every returned pair is a
//! transition along one of the edges accepted by
//! `HealthState::can_transition_to`; callers publish exactly those.

use crate::HealthState;

pub type Transition = (HealthState, HealthState);

#[derive(Debug, Clone)]
pub struct HealthTracker {
    state: HealthState,
    consecutive_failures: u32,
    unhealthy_threshold: u32,
}

impl HealthTracker {
    pub fn new(unhealthy_threshold: u32) -> Self {
        Self {
            state: HealthState::Unknown,
            consecutive_failures: 0,
            unhealthy_threshold: unhealthy_threshold.max(1),
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// A probe succeeded. Any non-healthy state goes straight to Healthy.
    pub fn record_success(&mut self) -> Option<Transition> {
        self.consecutive_failures = 0;
        self.move_to(HealthState::Healthy)
    }

    /// A probe failed.
    ///
    /// The first failure from Unknown or Healthy yields Degraded; reaching the
    /// threshold yields Unhealthy. With a threshold of 1 both happen at once,
    /// so up to two transitions come back. Failures while Unhealthy or
    /// Suspended are counted but produce nothing.
    pub fn record_failure(&mut self) -> Vec<Transition> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let mut transitions = Vec::new();

        if matches!(self.state, HealthState::Unknown | HealthState::Healthy) {
            self.consecutive_failures = 1;
            transitions.extend(self.move_to(HealthState::Degraded));
        }
        if self.state == HealthState::Degraded
            && self.consecutive_failures >= self.unhealthy_threshold
        {
            transitions.extend(self.move_to(HealthState::Unhealthy));
        }
        transitions
    }

    /// Reconnection took over. No-op from Unknown or when already suspended.
    pub fn suspend(&mut self) -> Option<Transition> {
        self.move_to(HealthState::Suspended)
    }

    fn move_to(&mut self, next: HealthState) -> Option<Transition> {
        let old = self.state;
        if old == next || !old.can_transition_to(next) {
            return None;
        }
        self.state = next;
        Some((old, next))
    }
}
