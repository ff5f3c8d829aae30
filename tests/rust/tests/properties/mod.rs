//! Property tests for the resilience state machines

mod queue;
mod retry;
