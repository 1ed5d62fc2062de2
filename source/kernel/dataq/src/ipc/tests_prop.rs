// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for the message FIFO
//! OWNERS: @kernel-ipc-team
//! NOTE: Tests only; no kernel logic. Checks the ring against a VecDeque model.
//!
//! TEST_SCOPE:
//!   - Exactly `capacity` messages are accepted before Full
//!   - Messages come out in the order they went in, across wrap-around
//!   - Zero capacity never buffers anything
//!
//! TEST_SCENARIOS:
//!   - matches_queue_model(): random push/pop sequences agree with VecDeque
//!   - fill_then_drain(): capacity pushes succeed, the next one is Full
//!   - zero_capacity_rejects_all(): every push is Full and every pop Empty

use std::collections::VecDeque;
use std::vec::Vec;

use super::{storage_slots, Fifo, QueueError};
use crate::types::Message;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Push(usize),
    Pop,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![any::<usize>().prop_map(Op::Push), Just(Op::Pop)]
}

proptest! {
    #[test]
    fn matches_queue_model(capacity in 1usize..9, ops in proptest::collection::vec(arb_op(), 0..64)) {
        let mut storage = vec![Message::default(); storage_slots(capacity)];
        let mut fifo = Fifo::new(Some(storage.as_mut_slice()), capacity).unwrap();
        let mut model = VecDeque::new();
        for op in ops {
            match op {
                Op::Push(raw) => {
                    let expected = if model.len() < capacity {
                        model.push_back(raw);
                        Ok(())
                    } else {
                        Err(QueueError::Full)
                    };
                    prop_assert_eq!(fifo.push(Message::from_raw(raw)), expected);
                }
                Op::Pop => {
                    let expected = model.pop_front().map(Message::from_raw).ok_or(QueueError::Empty);
                    prop_assert_eq!(fifo.pop(), expected);
                }
            }
            prop_assert_eq!(fifo.len(), model.len());
            prop_assert_eq!(fifo.is_empty(), model.is_empty());
            prop_assert_eq!(fifo.is_full(), model.len() == capacity);
        }
    }

    #[test]
    fn fill_then_drain(capacity in 1usize..16, extra_slots in 0usize..4) {
        let mut storage = vec![Message::default(); storage_slots(capacity) + extra_slots];
        let mut fifo = Fifo::new(Some(storage.as_mut_slice()), capacity).unwrap();
        for raw in 0..capacity {
            prop_assert_eq!(fifo.push(Message::from_raw(raw)), Ok(()));
        }
        prop_assert_eq!(fifo.push(Message::from_raw(usize::MAX)), Err(QueueError::Full));
        let drained: Vec<usize> = core::iter::from_fn(|| fifo.pop().ok()).map(Message::as_raw).collect();
        prop_assert_eq!(drained, (0..capacity).collect::<Vec<_>>());
    }

    #[test]
    fn zero_capacity_rejects_all(slots in 0usize..4, raws in proptest::collection::vec(any::<usize>(), 1..8)) {
        let mut storage = vec![Message::default(); slots + 1];
        let mut fifo = Fifo::new(Some(storage.as_mut_slice()), 0).unwrap();
        for raw in raws {
            prop_assert_eq!(fifo.push(Message::from_raw(raw)), Err(QueueError::Full));
            prop_assert_eq!(fifo.pop(), Err(QueueError::Empty));
        }
    }
}
