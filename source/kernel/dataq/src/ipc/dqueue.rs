// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Bounded message queue with blocking and polling send/receive
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (lifecycle, polling, context checks) + dataq-sim blocking scenarios
//! PUBLIC API: DataQueue (create/delete/send*/receive*/is_live/capacity/len)
//! DEPENDS_ON: ipc::fifo, sched::Kernel, task::TaskList
//! INVARIANTS: Senders wait only while the FIFO is full; receivers wait only while it is empty;
//!             wait lists are served strictly in arrival order
//! ADR: docs/adr/0001-data-queue-kernel-object.md
//!
//! A message offered while a receiver is waiting goes straight to that
//! receiver's transfer slot and never touches the FIFO. A receive that frees a
//! slot pulls the oldest blocked sender's message into it. With capacity 0 the
//! queue is a pure rendezvous point.

use super::fifo::Fifo;
use super::QueueError;
use crate::arch::Port;
use crate::kernel_assert;
use crate::sched::{Kernel, SchedState};
use crate::sync::{CriticalSection, IrqCell};
use crate::task::{TaskList, WaitOutcome, WaitReason};
use crate::types::{Message, Timeout};

struct QueueState<'s> {
    live: bool,
    fifo: Fifo<'s>,
}

/// Caller-allocated data queue.
///
/// The object starts non-live; [`DataQueue::create`] attaches storage.
pub struct DataQueue<'s> {
    state: IrqCell<QueueState<'s>>,
    senders: TaskList,
    receivers: TaskList,
}

// SAFETY: the wait lists are only touched under a kernel critical section.
unsafe impl Sync for DataQueue<'_> {}

impl<'s> DataQueue<'s> {
    pub const fn new() -> Self {
        Self {
            state: IrqCell::new(QueueState { live: false, fifo: Fifo::empty() }),
            senders: TaskList::new(),
            receivers: TaskList::new(),
        }
    }

    /// Makes the queue live over `storage`.
    ///
    /// `storage` needs [`storage_slots`](super::storage_slots)`(capacity)`
    /// slots. Without storage the queue only does direct hand-off.
    pub fn create<P: Port>(
        &self,
        kernel: &Kernel<P>,
        storage: Option<&'s mut [Message]>,
        capacity: usize,
    ) -> Result<(), QueueError> {
        if kernel.in_interrupt() {
            return Err(QueueError::WrongContext);
        }
        let fifo = Fifo::new(storage, capacity)?;
        let cs = kernel.critical();
        let mut state = self.state.borrow_mut(&cs);
        if state.live {
            return Err(QueueError::InvalidArgument);
        }
        self.senders.reset();
        self.receivers.reset();
        state.fifo = fifo;
        state.live = true;
        log::debug!(target: "dataq::queue", "create capacity={}", state.fifo.capacity());
        Ok(())
    }

    /// Retires the queue, waking every waiter with [`QueueError::Deleted`].
    ///
    /// Returns the storage passed to `create` so it can be reused.
    pub fn delete<P: Port>(&self, kernel: &Kernel<P>) -> Result<Option<&'s mut [Message]>, QueueError> {
        if kernel.in_interrupt() {
            return Err(QueueError::WrongContext);
        }
        let mut cs = kernel.critical();
        self.ensure_live(&cs)?;
        let mut woken = 0usize;
        // The queue stays live while woken tasks run, so they can block on it
        // again. Drain until both lists stay empty under one critical section.
        while !(self.senders.is_empty() && self.receivers.is_empty()) {
            for list in [&self.senders, &self.receivers] {
                loop {
                    let switch = {
                        let mut sched = kernel.sched(&cs);
                        let Some(id) = list.pop_front(&mut sched.tasks) else {
                            break;
                        };
                        sched.complete_wait(id, WaitOutcome::Deleted);
                        woken += 1;
                        sched.need_switch()
                    };
                    if switch {
                        drop(cs);
                        kernel.switch_context_if_needed();
                        cs = kernel.critical();
                    }
                }
            }
        }
        kernel_assert!(self.senders.is_empty() && self.receivers.is_empty(), "queue retired with waiters");
        let mut state = self.state.borrow_mut(&cs);
        state.live = false;
        log::debug!(target: "dataq::queue", "delete woke={}", woken);
        Ok(state.fifo.take_storage())
    }

    /// Sends `msg`, waiting up to `timeout` ticks while the queue is full.
    pub fn send<P: Port>(&self, kernel: &Kernel<P>, msg: Message, timeout: Timeout) -> Result<(), QueueError> {
        Self::check_blocking_context(kernel)?;
        if timeout.is_zero() {
            return Err(QueueError::InvalidArgument);
        }
        let cs = kernel.critical();
        self.ensure_live(&cs)?;
        let blocked = {
            let mut sched = kernel.sched(&cs);
            match self.offer(&cs, &mut sched, msg) {
                Ok(()) => false,
                Err(_) => {
                    sched.block_current(&self.senders, WaitReason::QueueSend, timeout, Some(msg));
                    log::trace!(target: "dataq::queue", "{} blocks sending", sched.current());
                    kernel_assert!(sched.need_switch(), "send blocked without a pending switch");
                    true
                }
            }
        };
        drop(cs);
        kernel.switch_context_if_needed();
        if !blocked {
            return Ok(());
        }
        let (outcome, _unsent) = kernel.finish_wait();
        wait_result(outcome)
    }

    /// Sends `msg` from task context without waiting.
    pub fn send_polling<P: Port>(&self, kernel: &Kernel<P>, msg: Message) -> Result<(), QueueError> {
        if kernel.in_interrupt() {
            return Err(QueueError::WrongContext);
        }
        let result = {
            let cs = kernel.critical();
            self.ensure_live(&cs)?;
            let mut sched = kernel.sched(&cs);
            self.offer(&cs, &mut sched, msg)
        };
        kernel.switch_context_if_needed();
        result
    }

    /// Sends `msg` from an interrupt handler without waiting.
    ///
    /// A woken receiver runs once the handler returns.
    pub fn send_polling_from_interrupt<P: Port>(&self, kernel: &Kernel<P>, msg: Message) -> Result<(), QueueError> {
        if !kernel.in_interrupt() {
            return Err(QueueError::WrongContext);
        }
        let cs = kernel.critical_from_isr();
        self.ensure_live(&cs)?;
        let mut sched = kernel.sched(&cs);
        self.offer(&cs, &mut sched, msg)
    }

    /// Receives a message, waiting up to `timeout` ticks while the queue is empty.
    pub fn receive<P: Port>(&self, kernel: &Kernel<P>, timeout: Timeout) -> Result<Message, QueueError> {
        Self::check_blocking_context(kernel)?;
        if timeout.is_zero() {
            return Err(QueueError::InvalidArgument);
        }
        let cs = kernel.critical();
        self.ensure_live(&cs)?;
        let taken = {
            let mut sched = kernel.sched(&cs);
            match self.take(&cs, &mut sched) {
                Ok(msg) => Some(msg),
                Err(_) => {
                    sched.block_current(&self.receivers, WaitReason::QueueReceive, timeout, None);
                    log::trace!(target: "dataq::queue", "{} blocks receiving", sched.current());
                    kernel_assert!(sched.need_switch(), "receive blocked without a pending switch");
                    None
                }
            }
        };
        drop(cs);
        kernel.switch_context_if_needed();
        if let Some(msg) = taken {
            return Ok(msg);
        }
        let (outcome, transfer) = kernel.finish_wait();
        wait_result(outcome)?;
        match transfer {
            Some(msg) => Ok(msg),
            None => {
                kernel_assert!(false, "receive completed without a transferred message");
                Err(QueueError::Empty)
            }
        }
    }

    /// Receives a message from task context without waiting.
    pub fn receive_polling<P: Port>(&self, kernel: &Kernel<P>) -> Result<Message, QueueError> {
        if kernel.in_interrupt() {
            return Err(QueueError::WrongContext);
        }
        let result = {
            let cs = kernel.critical();
            self.ensure_live(&cs)?;
            let mut sched = kernel.sched(&cs);
            self.take(&cs, &mut sched)
        };
        kernel.switch_context_if_needed();
        result
    }

    /// Receives a message from an interrupt handler without waiting.
    pub fn receive_polling_from_interrupt<P: Port>(&self, kernel: &Kernel<P>) -> Result<Message, QueueError> {
        if !kernel.in_interrupt() {
            return Err(QueueError::WrongContext);
        }
        let cs = kernel.critical_from_isr();
        self.ensure_live(&cs)?;
        let mut sched = kernel.sched(&cs);
        self.take(&cs, &mut sched)
    }

    pub fn is_live<P: Port>(&self, kernel: &Kernel<P>) -> bool {
        let cs = kernel.critical_any();
        let live = self.state.borrow_mut(&cs).live;
        live
    }

    /// Usable message slots; 0 for a rendezvous queue.
    pub fn capacity<P: Port>(&self, kernel: &Kernel<P>) -> usize {
        let cs = kernel.critical_any();
        let capacity = self.state.borrow_mut(&cs).fifo.capacity();
        capacity
    }

    /// Buffered messages, excluding those held by blocked senders.
    pub fn len<P: Port>(&self, kernel: &Kernel<P>) -> usize {
        let cs = kernel.critical_any();
        let len = self.state.borrow_mut(&cs).fifo.len();
        len
    }

    pub fn waiting_senders<P: Port>(&self, kernel: &Kernel<P>) -> usize {
        Self::count_waiters(kernel, &self.senders)
    }

    pub fn waiting_receivers<P: Port>(&self, kernel: &Kernel<P>) -> usize {
        Self::count_waiters(kernel, &self.receivers)
    }

    fn count_waiters<P: Port>(kernel: &Kernel<P>, list: &TaskList) -> usize {
        let cs = kernel.critical_any();
        let sched = kernel.sched(&cs);
        let count = list.iter(&sched.tasks).count();
        count
    }

    fn check_blocking_context<P: Port>(kernel: &Kernel<P>) -> Result<(), QueueError> {
        if kernel.in_interrupt() || kernel.current_task().is_idle() {
            return Err(QueueError::WrongContext);
        }
        Ok(())
    }

    fn ensure_live(&self, cs: &CriticalSection<'_>) -> Result<(), QueueError> {
        if self.state.borrow_mut(cs).live {
            Ok(())
        } else {
            Err(QueueError::NotExists)
        }
    }

    /// Hands `msg` to the oldest waiting receiver, or buffers it.
    fn offer(&self, cs: &CriticalSection<'_>, sched: &mut SchedState, msg: Message) -> Result<(), QueueError> {
        if let Some(receiver) = self.receivers.pop_front(&mut sched.tasks) {
            sched.put_transfer(receiver, msg);
            sched.complete_wait(receiver, WaitOutcome::Completed);
            log::trace!(target: "dataq::queue", "hand-off to {}", receiver);
            return Ok(());
        }
        let pushed = self.state.borrow_mut(cs).fifo.push(msg);
        if pushed.is_err() {
            log::trace!(target: "dataq::queue", "send: full");
        }
        pushed
    }

    /// Takes the oldest message, refilling from or handing off with the
    /// oldest blocked sender.
    fn take(&self, cs: &CriticalSection<'_>, sched: &mut SchedState) -> Result<Message, QueueError> {
        let mut state = self.state.borrow_mut(cs);
        match state.fifo.pop() {
            Ok(msg) => {
                if let Some(sender) = self.senders.pop_front(&mut sched.tasks) {
                    let pending = sched.take_transfer(sender);
                    kernel_assert!(pending.is_some(), "{} blocked without a message", sender);
                    if let Some(pending) = pending {
                        let refilled = state.fifo.push(pending);
                        kernel_assert!(refilled.is_ok(), "freed slot rejected a pending message");
                    }
                    sched.complete_wait(sender, WaitOutcome::Completed);
                    log::trace!(target: "dataq::queue", "refill from {}", sender);
                }
                Ok(msg)
            }
            Err(_) => {
                let Some(sender) = self.senders.pop_front(&mut sched.tasks) else {
                    log::trace!(target: "dataq::queue", "receive: empty");
                    return Err(QueueError::Empty);
                };
                let pending = sched.take_transfer(sender);
                sched.complete_wait(sender, WaitOutcome::Completed);
                log::trace!(target: "dataq::queue", "hand-off from {}", sender);
                match pending {
                    Some(msg) => Ok(msg),
                    None => {
                        kernel_assert!(false, "{} blocked without a message", sender);
                        Err(QueueError::Empty)
                    }
                }
            }
        }
    }
}

impl Default for DataQueue<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps the wake result left by the waker onto the caller's result.
fn wait_result(outcome: WaitOutcome) -> Result<(), QueueError> {
    match outcome {
        WaitOutcome::Completed => Ok(()),
        WaitOutcome::Timeout => Err(QueueError::Timeout),
        WaitOutcome::Deleted => Err(QueueError::Deleted),
        WaitOutcome::Pending => {
            kernel_assert!(false, "task resumed while its wait is pending");
            Err(QueueError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::mock::MockPort;
    use crate::ipc::storage_slots;
    use crate::sched::QosClass;

    fn msg(raw: usize) -> Message {
        Message::from_raw(raw)
    }

    #[test]
    fn polling_round_trip_in_order() {
        let kernel = Kernel::new(MockPort::default());
        let mut storage = [Message::default(); storage_slots(2)];
        let queue = DataQueue::new();
        queue.create(&kernel, Some(&mut storage[..]), 2).unwrap();
        assert_eq!(queue.send_polling(&kernel, msg(1)), Ok(()));
        assert_eq!(queue.send_polling(&kernel, msg(2)), Ok(()));
        assert_eq!(queue.send_polling(&kernel, msg(3)), Err(QueueError::Full));
        assert_eq!(queue.len(&kernel), 2);
        assert_eq!(queue.receive_polling(&kernel), Ok(msg(1)));
        assert_eq!(queue.receive_polling(&kernel), Ok(msg(2)));
        assert_eq!(queue.receive_polling(&kernel), Err(QueueError::Empty));
        assert!(!kernel.port().is_masked());
    }

    #[test]
    fn operations_on_dead_queue_fail() {
        let kernel = Kernel::new(MockPort::default());
        let queue = DataQueue::new();
        assert!(!queue.is_live(&kernel));
        assert_eq!(queue.send_polling(&kernel, msg(1)), Err(QueueError::NotExists));
        assert_eq!(queue.receive_polling(&kernel), Err(QueueError::NotExists));
        assert_eq!(queue.delete(&kernel), Err(QueueError::NotExists));
        assert!(!kernel.port().is_masked(), "early return must unmask");
    }

    #[test]
    fn create_validates_before_mutating() {
        let kernel = Kernel::new(MockPort::default());
        let mut short = [Message::default(); 2];
        let mut storage = [Message::default(); 4];
        let queue = DataQueue::new();
        assert_eq!(queue.create(&kernel, Some(&mut short[..]), 2), Err(QueueError::InvalidArgument));
        assert!(!queue.is_live(&kernel));
        queue.create(&kernel, Some(&mut storage[..]), 3).unwrap();
        assert_eq!(queue.capacity(&kernel), 3);
        assert_eq!(queue.create(&kernel, None, 0), Err(QueueError::InvalidArgument));
        assert_eq!(queue.capacity(&kernel), 3, "second create must not touch the live queue");
    }

    #[test]
    fn delete_returns_storage_for_reuse() {
        let kernel = Kernel::new(MockPort::default());
        let mut storage = [Message::default(); 2];
        let queue = DataQueue::new();
        queue.create(&kernel, Some(&mut storage[..]), 1).unwrap();
        queue.send_polling(&kernel, msg(5)).unwrap();
        let storage = queue.delete(&kernel).unwrap().unwrap();
        assert_eq!(queue.send_polling(&kernel, msg(6)), Err(QueueError::NotExists));
        queue.create(&kernel, Some(storage), 1).unwrap();
        assert_eq!(queue.receive_polling(&kernel), Err(QueueError::Empty), "recreated queue starts empty");
    }

    #[test]
    fn zero_capacity_accepts_empty_storage() {
        let kernel = Kernel::new(MockPort::default());
        let mut storage: [Message; 0] = [];
        let queue = DataQueue::new();
        assert_eq!(queue.create(&kernel, Some(&mut storage[..]), 0), Ok(()));
        assert_eq!(queue.capacity(&kernel), 0);
        assert_eq!(queue.send_polling(&kernel, msg(1)), Err(QueueError::Full));
        assert_eq!(queue.delete(&kernel).map(|slots| slots.map(|s| s.len())), Ok(Some(0)));
    }

    #[test]
    fn storage_less_queue_is_rendezvous_only() {
        let kernel = Kernel::new(MockPort::default());
        let queue = DataQueue::new();
        queue.create(&kernel, None, 4).unwrap();
        assert_eq!(queue.capacity(&kernel), 0);
        assert_eq!(queue.send_polling(&kernel, msg(1)), Err(QueueError::Full));
        assert_eq!(queue.receive_polling(&kernel), Err(QueueError::Empty));
        assert_eq!(queue.delete(&kernel), Ok(None));
    }

    #[test]
    fn context_is_checked_first() {
        let kernel = Kernel::new(MockPort::default());
        let queue = DataQueue::new();
        // Idle task, dead queue, zero timeout: the context error wins.
        assert_eq!(queue.send(&kernel, msg(1), Timeout::ticks(0)), Err(QueueError::WrongContext));
        assert_eq!(queue.receive(&kernel, Timeout::INFINITE), Err(QueueError::WrongContext));
        assert_eq!(queue.send_polling_from_interrupt(&kernel, msg(1)), Err(QueueError::WrongContext));
        assert_eq!(queue.receive_polling_from_interrupt(&kernel), Err(QueueError::WrongContext));

        kernel.port().set_in_interrupt(true);
        assert_eq!(queue.send_polling(&kernel, msg(1)), Err(QueueError::WrongContext));
        assert_eq!(queue.receive_polling(&kernel), Err(QueueError::WrongContext));
        assert_eq!(queue.create(&kernel, None, 0), Err(QueueError::WrongContext));
        assert_eq!(queue.delete(&kernel), Err(QueueError::WrongContext));
        assert_eq!(queue.send_polling_from_interrupt(&kernel, msg(1)), Err(QueueError::NotExists));
    }

    #[test]
    fn zero_timeout_is_rejected_before_liveness() {
        let kernel = Kernel::new(MockPort::default());
        kernel.spawn(QosClass::Normal).unwrap();
        kernel.switch_context_if_needed();
        let queue = DataQueue::new();
        assert_eq!(queue.send(&kernel, msg(1), Timeout::ticks(0)), Err(QueueError::InvalidArgument));
        assert_eq!(queue.receive(&kernel, Timeout::ticks(0)), Err(QueueError::InvalidArgument));
        assert_eq!(queue.receive(&kernel, Timeout::ticks(1)), Err(QueueError::NotExists));
    }

    #[test]
    fn blocking_calls_take_fast_path_without_waiting() {
        let kernel = Kernel::new(MockPort::default());
        kernel.spawn(QosClass::Normal).unwrap();
        kernel.switch_context_if_needed();
        let mut storage = [Message::default(); 2];
        let queue = DataQueue::new();
        queue.create(&kernel, Some(&mut storage[..]), 1).unwrap();
        assert_eq!(queue.send(&kernel, msg(7), Timeout::INFINITE), Ok(()));
        assert_eq!(queue.receive(&kernel, Timeout::ticks(3)), Ok(msg(7)));
    }

    #[test]
    fn interrupt_variants_move_messages() {
        let kernel = Kernel::new(MockPort::default());
        let mut storage = [Message::default(); 3];
        let queue = DataQueue::new();
        queue.create(&kernel, Some(&mut storage[..]), 2).unwrap();
        kernel.port().set_in_interrupt(true);
        assert_eq!(queue.send_polling_from_interrupt(&kernel, msg(1)), Ok(()));
        assert_eq!(queue.len(&kernel), 1);
        assert_eq!(queue.receive_polling_from_interrupt(&kernel), Ok(msg(1)));
        assert_eq!(queue.receive_polling_from_interrupt(&kernel), Err(QueueError::Empty));
        kernel.port().set_in_interrupt(false);
        assert!(!kernel.port().is_masked());
    }
}
