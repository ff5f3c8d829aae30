//! Resilience state machines
//!
//! Pure, clock-injected building blocks used by the runtime:
//!
//! - `RetryPolicy` - exponential backoff with jitter
//! - `CircuitBreaker` - Closed/Open/HalfOpen failure guard
//! - `OperationQueue` - bounded FIFO of operations deferred during an outage
//! - `HealthTracker` - per-service health state machine
//!
//! None of these spawn tasks or take locks; owners wrap them in a mutex.
//! Time-dependent methods take a `tokio::time::Instant` so paused-clock tests
//! drive them deterministically.

mod circuit_breaker;
mod health;
mod queue;
mod retry;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use health::HealthTracker;
pub use queue::{OperationQueue, QueueFull, QueuedOperation};
pub use retry::RetryPolicy;
