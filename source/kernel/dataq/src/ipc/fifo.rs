// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Ring buffer over caller-owned message storage
//! OWNERS: @kernel-ipc-team
//! PUBLIC API: Fifo (new/empty/push/pop/len/capacity/take_storage), storage_slots()
//! DEPENDS_ON: types::Message
//! INVARIANTS: head == tail iff empty; full iff (head + 1) mod (capacity + 1) == tail
//! ADR: docs/adr/0001-data-queue-kernel-object.md
//!
//! One slot always stays unused so that full and empty can be told apart
//! without an element counter. Callers size storage with [`storage_slots`].
//! Neither operation touches tasks; the caller holds the critical section.

use super::QueueError;
use crate::types::Message;

/// Number of storage slots a queue of `capacity` messages needs.
pub const fn storage_slots(capacity: usize) -> usize {
    capacity.saturating_add(1)
}

/// Bounded FIFO of messages.
#[derive(Debug)]
pub struct Fifo<'s> {
    slots: Option<&'s mut [Message]>,
    capacity: usize,
    head: usize,
    tail: usize,
}

impl<'s> Fifo<'s> {
    /// A FIFO without storage. Every push and pop fails.
    pub const fn empty() -> Self {
        Self { slots: None, capacity: 0, head: 0, tail: 0 }
    }

    /// Wraps `storage` as a FIFO holding up to `capacity` messages.
    ///
    /// Without storage the capacity is forced to 0. Storage shorter than
    /// [`storage_slots`]`(capacity)` is rejected unless the capacity is 0,
    /// which never touches a slot. Extra slots stay unused.
    pub fn new(storage: Option<&'s mut [Message]>, capacity: usize) -> Result<Self, QueueError> {
        let Some(slots) = storage else {
            return Ok(Self::empty());
        };
        if capacity == usize::MAX || (capacity > 0 && slots.len() < storage_slots(capacity)) {
            return Err(QueueError::InvalidArgument);
        }
        Ok(Self { slots: Some(slots), capacity, head: 0, tail: 0 })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn span(&self) -> usize {
        self.capacity + 1
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.capacity == 0 || (self.head + 1) % self.span() == self.tail
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        (self.head + self.span() - self.tail) % self.span()
    }

    /// Appends `msg` at the head cursor.
    pub fn push(&mut self, msg: Message) -> Result<(), QueueError> {
        if self.is_full() {
            return Err(QueueError::Full);
        }
        let span = self.span();
        let Some(slots) = self.slots.as_deref_mut() else {
            return Err(QueueError::Full);
        };
        slots[self.head] = msg;
        self.head = (self.head + 1) % span;
        Ok(())
    }

    /// Removes the oldest message from the tail cursor.
    pub fn pop(&mut self) -> Result<Message, QueueError> {
        if self.capacity == 0 || self.is_empty() {
            return Err(QueueError::Empty);
        }
        let span = self.span();
        let Some(slots) = self.slots.as_deref() else {
            return Err(QueueError::Empty);
        };
        let msg = slots[self.tail];
        self.tail = (self.tail + 1) % span;
        Ok(msg)
    }

    /// Gives the storage back and leaves an empty, storage-less FIFO behind.
    pub fn take_storage(&mut self) -> Option<&'s mut [Message]> {
        let slots = self.slots.take();
        *self = Self::empty();
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(raw: usize) -> Message {
        Message::from_raw(raw)
    }

    #[test]
    fn holds_exactly_capacity_messages() {
        let mut storage = [Message::default(); 3];
        let mut fifo = Fifo::new(Some(&mut storage[..]), 2).unwrap();
        assert_eq!(fifo.push(msg(1)), Ok(()));
        assert_eq!(fifo.push(msg(2)), Ok(()));
        assert_eq!(fifo.push(msg(3)), Err(QueueError::Full));
        assert_eq!(fifo.len(), 2);
        assert_eq!(fifo.pop(), Ok(msg(1)));
        assert_eq!(fifo.pop(), Ok(msg(2)));
        assert_eq!(fifo.pop(), Err(QueueError::Empty));
    }

    #[test]
    fn cursors_wrap_around() {
        let mut storage = [Message::default(); 3];
        let mut fifo = Fifo::new(Some(&mut storage[..]), 2).unwrap();
        for round in 0..10 {
            fifo.push(msg(round)).unwrap();
            fifo.push(msg(round + 100)).unwrap();
            assert!(fifo.is_full());
            assert_eq!(fifo.pop(), Ok(msg(round)));
            assert_eq!(fifo.pop(), Ok(msg(round + 100)));
            assert!(fifo.is_empty());
        }
    }

    #[test]
    fn zero_capacity_never_buffers() {
        let mut storage = [Message::default(); 4];
        let mut fifo = Fifo::new(Some(&mut storage[..]), 0).unwrap();
        assert_eq!(fifo.push(msg(1)), Err(QueueError::Full));
        assert_eq!(fifo.pop(), Err(QueueError::Empty));
        assert_eq!(fifo.len(), 0);
    }

    #[test]
    fn zero_capacity_accepts_empty_storage() {
        let mut storage: [Message; 0] = [];
        let mut fifo = Fifo::new(Some(&mut storage[..]), 0).unwrap();
        assert_eq!(fifo.push(msg(1)), Err(QueueError::Full));
        assert_eq!(fifo.pop(), Err(QueueError::Empty));
        assert_eq!(fifo.take_storage().map(|slots| slots.len()), Some(0));
    }

    #[test]
    fn missing_storage_forces_zero_capacity() {
        let mut fifo = Fifo::new(None, 8).unwrap();
        assert_eq!(fifo.capacity(), 0);
        assert_eq!(fifo.push(msg(1)), Err(QueueError::Full));
    }

    #[test]
    fn short_storage_is_rejected() {
        let mut storage = [Message::default(); 2];
        assert_eq!(Fifo::new(Some(&mut storage[..]), 2).unwrap_err(), QueueError::InvalidArgument);
        assert!(Fifo::new(Some(&mut storage[..]), 1).is_ok());
    }

    #[test]
    fn take_storage_resets() {
        let mut storage = [Message::default(); 2];
        let mut fifo = Fifo::new(Some(&mut storage[..]), 1).unwrap();
        fifo.push(msg(9)).unwrap();
        let slots = fifo.take_storage().unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(fifo.capacity(), 0);
        assert!(fifo.is_empty());
        assert!(fifo.take_storage().is_none());
    }
}
