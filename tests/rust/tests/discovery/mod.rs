//! Discovery integration tests
//!
//! Deadline-bounded concurrent discovery, port fallback against real sockets,
//! rediscovery after a port change, and cancellation.

mod deadline;
