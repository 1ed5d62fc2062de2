// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Static task table and per-task wait bookkeeping
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (allocation, wait bookkeeping) + dataq-sim scenarios
//! PUBLIC API: TaskTable, TaskState, WaitReason, WaitOutcome, TaskList, SpawnError
//! DEPENDS_ON: sched::QosClass, types::{TaskId, Message}
//! INVARIANTS: Slot index == TaskId; a waiting task is on exactly one wait list
//! ADR: docs/adr/0001-data-queue-kernel-object.md

use core::ptr::NonNull;

use bitflags::bitflags;

use crate::config::MAX_TASKS;
use crate::sched::QosClass;
use crate::types::{Message, TaskId};

pub mod list;

use list::Link;
pub use list::TaskList;

bitflags! {
    /// Lifecycle state of a task control block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskState: u8 {
        /// Running or ready to run.
        const RUNNABLE = 1 << 0;
        /// Blocked on a wait list.
        const WAIT = 1 << 1;
        /// Finished; the slot stays allocated.
        const DORMANT = 1 << 2;
    }
}

/// Why a task sits on a wait list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    QueueSend,
    QueueReceive,
}

/// Result deposited on a task by whoever ends its wait.
///
/// This is the only authoritative wake result; there is no secondary code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Still waiting (or never waited).
    Pending,
    /// A counterpart accepted or supplied the message.
    Completed,
    /// The timeout elapsed first.
    Timeout,
    /// The object was deleted while waiting.
    Deleted,
}

/// Errors returned when creating tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    /// Every task control block is in use.
    #[error("task table full")]
    TableFull,
}

/// Task control block.
#[derive(Debug)]
pub(crate) struct Tcb {
    pub(crate) qos: QosClass,
    pub(crate) state: TaskState,
    pub(crate) wait_reason: Option<WaitReason>,
    /// Remaining ticks; `None` waits forever.
    pub(crate) timeout: Option<u32>,
    pub(crate) outcome: WaitOutcome,
    /// Single-message mailbox written by whoever completes the wait.
    pub(crate) transfer: Option<Message>,
    pub(crate) link: Link,
    /// Wait list holding this task while `state` contains `WAIT`.
    pub(crate) wait_list: Option<NonNull<TaskList>>,
}

// SAFETY: `wait_list` is only dereferenced under a critical section, while the
// task is still linked into that list. The list is embedded in an object the
// blocked task borrows for the whole blocking call, so it cannot move or drop.
unsafe impl Send for Tcb {}

impl Tcb {
    const VACANT: Tcb = Tcb {
        qos: QosClass::Idle,
        state: TaskState::empty(),
        wait_reason: None,
        timeout: None,
        outcome: WaitOutcome::Pending,
        transfer: None,
        link: Link::UNLINKED,
        wait_list: None,
    };

    pub(crate) fn is_waiting(&self) -> bool {
        self.state.contains(TaskState::WAIT)
    }
}

/// Fixed-size table of task control blocks.
pub struct TaskTable {
    slots: [Tcb; MAX_TASKS],
    len: usize,
}

impl TaskTable {
    pub const fn new() -> Self {
        Self { slots: [Tcb::VACANT; MAX_TASKS], len: 0 }
    }

    /// Claims the next free slot. The new task starts dormant.
    pub fn allocate(&mut self, qos: QosClass) -> Result<TaskId, SpawnError> {
        if self.len >= MAX_TASKS {
            return Err(SpawnError::TableFull);
        }
        let id = TaskId::from_raw(self.len as u32);
        self.slots[self.len] = Tcb { qos, state: TaskState::DORMANT, ..Tcb::VACANT };
        self.len += 1;
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, id: TaskId) -> bool {
        id.as_index() < self.len
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.contains(id).then(|| self.get(id).state)
    }

    pub(crate) fn get(&self, id: TaskId) -> &Tcb {
        &self.slots[id.as_index()]
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> &mut Tcb {
        &mut self.slots[id.as_index()]
    }

    /// Iterates over allocated task ids.
    pub fn ids(&self) -> impl Iterator<Item = TaskId> {
        (0..self.len as u32).map(TaskId::from_raw)
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}
