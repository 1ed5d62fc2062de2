// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Newtypes shared by the task table, scheduler and data queues
//! OWNERS: @kernel-team
//! PUBLIC API: TaskId, Message, Timeout
//! DEPENDS_ON: static_assertions
//! INVARIANTS: Message is exactly pointer sized; Timeout::INFINITE never expires
//! ADR: docs/adr/0001-data-queue-kernel-object.md
//!
//! Newtypes keep task handles, message payloads and tick counts from being
//! mixed up at call sites while compiling down to the raw integer.

use core::fmt;

/// Handle of a task control block.
///
/// **Ownership**: Only `TaskTable` hands out task ids.
/// **Invariant**: `TaskId::IDLE` (raw 0) always exists and never blocks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TaskId(u32);

impl TaskId {
    /// The idle task created together with the kernel.
    pub const IDLE: TaskId = TaskId(0);

    /// Creates a task id from a raw value (kernel-internal only).
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw task id value.
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Returns the id as an index into the task table.
    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_idle(self) -> bool {
        self.0 == Self::IDLE.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Opaque, pointer-sized datum carried by a data queue.
///
/// The queue never interprets the value; producers commonly stash a pointer
/// to a caller-owned buffer in it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Message(usize);

static_assertions::assert_eq_size!(Message, usize);
static_assertions::assert_eq_size!(Message, *const ());

impl Message {
    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> usize {
        self.0
    }

    /// Wraps a pointer. The queue does not take ownership of the pointee.
    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    #[inline]
    pub fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }
}

/// Wait bound of a blocking call, in scheduler ticks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct Timeout(u32);

impl Timeout {
    /// Waits until the call completes or the queue is deleted.
    pub const INFINITE: Timeout = Timeout(u32::MAX);

    #[inline]
    pub const fn ticks(ticks: u32) -> Self {
        Self(ticks)
    }

    #[inline]
    pub const fn as_ticks(self) -> u32 {
        self.0
    }

    /// A zero timeout is rejected by every blocking call.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_infinite(self) -> bool {
        self.0 == Self::INFINITE.0
    }
}
