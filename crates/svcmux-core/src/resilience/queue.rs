//! Bounded FIFO of operations deferred while a service is unreachable

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::Operation;

/// An operation waiting for its service to come back.
///
/// `ticket` is whatever the owner needs to report the outcome back to the
/// submitter (typically a oneshot sender).
#[derive(Debug)]
pub struct QueuedOperation<T> {
    pub operation: Operation,
    pub enqueued_at: Instant,
    pub ticket: T,
}

impl<T> QueuedOperation<T> {
    pub fn new(operation: Operation, ticket: T) -> Self {
        Self {
            operation,
            enqueued_at: Instant::now(),
            ticket,
        }
    }

    pub fn waited(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.enqueued_at)
    }
}

/// Rejected push; carries the item back to the caller
pub struct QueueFull<T> {
    pub capacity: usize,
    pub item: QueuedOperation<T>,
}

impl<T> fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueFull")
            .field("capacity", &self.capacity)
            .field("operation", &self.item.operation.id)
            .finish()
    }
}

/// Bounded FIFO with replay reservations.
///
/// During a drain, items are popped one at a time with `begin_replay`. A popped
/// item still counts against capacity until `finish_replay` (executed) or
/// `requeue_front` (put back at the head), so new submissions can never take
/// the slot of an item that is being replayed. `len() + in_flight <= capacity`
/// always holds.
#[derive(Debug)]
pub struct OperationQueue<T> {
    items: VecDeque<QueuedOperation<T>>,
    capacity: usize,
    in_flight: usize,
}

impl<T> OperationQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            in_flight: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Waiting items, excluding those currently being replayed
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Waiting plus in-flight items
    pub fn depth(&self) -> usize {
        self.items.len() + self.in_flight
    }

    pub fn is_full(&self) -> bool {
        self.depth() >= self.capacity
    }

    pub fn push(&mut self, item: QueuedOperation<T>) -> Result<(), QueueFull<T>> {
        if self.is_full() {
            return Err(QueueFull {
                capacity: self.capacity,
                item,
            });
        }
        self.items.push_back(item);
        Ok(())
    }

    /// Pop the head for replay, reserving its slot
    pub fn begin_replay(&mut self) -> Option<QueuedOperation<T>> {
        let item = self.items.pop_front()?;
        self.in_flight += 1;
        Some(item)
    }

    /// Release the reservation of a replayed item
    pub fn finish_replay(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Put a replayed item back at the head, preserving FIFO order
    pub fn requeue_front(&mut self, item: QueuedOperation<T>) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.items.push_front(item);
    }

    /// Remove everything (shutdown)
    pub fn drain_all(&mut self) -> Vec<QueuedOperation<T>> {
        self.in_flight = 0;
        self.items.drain(..).collect()
    }
}
