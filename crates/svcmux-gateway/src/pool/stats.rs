//! Pool statistics

use std::time::Duration;

use serde::Serialize;

/// Upper bounds of the wait-time histogram buckets; the last bucket is open
const WAIT_BUCKETS: [Duration; 5] = [
    Duration::from_millis(1),
    Duration::from_millis(10),
    Duration::from_millis(100),
    Duration::from_secs(1),
    Duration::from_secs(10),
];

/// Acquire wait times: `<1ms, <10ms, <100ms, <1s, <10s, >=10s`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WaitHistogram(pub [u64; 6]);

impl WaitHistogram {
    pub fn bucket(wait: Duration) -> usize {
        WAIT_BUCKETS
            .iter()
            .position(|bound| wait < *bound)
            .unwrap_or(WAIT_BUCKETS.len())
    }

    pub fn record(&mut self, wait: Duration) {
        let idx = Self::bucket(wait);
        self.0[idx] = self.0[idx].saturating_add(1);
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }
}

/// Point-in-time view of one pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Connections ever created
    pub created: u64,
    /// Connections destroyed (invalid, failed, reaped, suspended, shut down)
    pub destroyed: u64,
    /// Acquires served by an idle connection
    pub reused: u64,
    pub acquired: u64,
    pub released: u64,
    /// Acquires that hit the deadline
    pub timeouts: u64,
    /// Transport failures reported by borrowers
    pub failures: u64,
    pub in_use: usize,
    pub idle: usize,
    pub suspended: bool,
    pub wait_histogram: WaitHistogram,
}
