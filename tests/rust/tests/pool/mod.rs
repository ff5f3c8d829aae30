//! Connection pool integration tests
//!
//! Capacity limits, blocking acquisition, exclusive lending under
//! concurrency, and failed-connection handling.

mod failures;
