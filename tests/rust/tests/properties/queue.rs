//! Queue depth never exceeds capacity and replay keeps FIFO order

use std::collections::VecDeque;

use proptest::prelude::*;
use svcmux_core::{Operation, OperationQueue, QueuedOperation};

#[derive(Debug, Clone, Copy)]
enum Step {
    Push,
    BeginReplay,
    FinishReplay,
    Requeue,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => Just(Step::Push),
        2 => Just(Step::BeginReplay),
        2 => Just(Step::FinishReplay),
        1 => Just(Step::Requeue),
    ]
}

proptest! {
    #[test]
    fn depth_bounded_and_fifo(
        capacity in 1usize..16,
        steps in prop::collection::vec(step(), 0..128),
    ) {
        let mut queue: OperationQueue<u32> = OperationQueue::new(capacity);
        // Model: waiting tickets in order, plus the one being replayed
        let mut model: VecDeque<u32> = VecDeque::new();
        let mut replaying: Option<QueuedOperation<u32>> = None;
        let mut next = 0u32;

        for step in steps {
            match step {
                Step::Push => {
                    let result = queue.push(QueuedOperation::new(Operation::new("x"), next));
                    let full = model.len() + usize::from(replaying.is_some()) >= capacity;
                    prop_assert_eq!(result.is_err(), full);
                    if !full {
                        model.push_back(next);
                    }
                    next += 1;
                }
                Step::BeginReplay if replaying.is_none() => {
                    let item = queue.begin_replay();
                    prop_assert_eq!(item.as_ref().map(|i| i.ticket), model.pop_front());
                    replaying = item;
                }
                Step::FinishReplay => {
                    if replaying.take().is_some() {
                        queue.finish_replay();
                    }
                }
                Step::Requeue => {
                    if let Some(item) = replaying.take() {
                        model.push_front(item.ticket);
                        queue.requeue_front(item);
                    }
                }
                Step::BeginReplay => {}
            }

            prop_assert!(queue.depth() <= capacity);
            prop_assert_eq!(queue.len(), model.len());
            prop_assert_eq!(queue.depth(), model.len() + usize::from(replaying.is_some()));
        }

        let drained: Vec<u32> = queue.drain_all().into_iter().map(|i| i.ticket).collect();
        prop_assert_eq!(drained, Vec::from(model));
    }
}
