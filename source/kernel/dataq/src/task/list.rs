// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Intrusive FIFO of task ids (wait lists and ready lists)
//! OWNERS: @kernel-sched-team
//! PUBLIC API: TaskList (new/is_empty/front/push_back/push_front/pop_front/remove/iter)
//! DEPENDS_ON: task::TaskTable (link storage)
//! INVARIANTS: A task is linked into at most one list; every operation is O(1)
//! ADR: docs/adr/0001-data-queue-kernel-object.md
//!
//! The links live in the task control blocks, so the list itself is just a
//! head/tail pair and needs no storage of its own. The head and tail are
//! `Cell`s: a list embedded in a caller-owned object is mutated through a
//! shared reference while the caller holds a critical section.

use core::cell::Cell;

use super::TaskTable;
use crate::kernel_assert;
use crate::types::TaskId;

/// Per-task link fields used by [`TaskList`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Link {
    prev: Option<TaskId>,
    next: Option<TaskId>,
    linked: bool,
}

impl Link {
    pub(crate) const UNLINKED: Link = Link { prev: None, next: None, linked: false };

    pub(crate) const fn is_linked(&self) -> bool {
        self.linked
    }
}

/// Doubly linked FIFO of tasks.
#[derive(Debug, Default)]
pub struct TaskList {
    head: Cell<Option<TaskId>>,
    tail: Cell<Option<TaskId>>,
}

impl TaskList {
    pub const fn new() -> Self {
        Self { head: Cell::new(None), tail: Cell::new(None) }
    }

    pub fn is_empty(&self) -> bool {
        self.head.get().is_none()
    }

    pub fn front(&self) -> Option<TaskId> {
        self.head.get()
    }

    /// Forgets every member without touching their links.
    ///
    /// Only valid on a list nobody is linked into (queue creation).
    pub(crate) fn reset(&self) {
        self.head.set(None);
        self.tail.set(None);
    }

    /// Appends `id`; the task must not be linked anywhere.
    pub fn push_back(&self, tasks: &mut TaskTable, id: TaskId) {
        kernel_assert!(!tasks.get(id).link.is_linked(), "{} already on a list", id);
        let old_tail = self.tail.get();
        tasks.get_mut(id).link = Link { prev: old_tail, next: None, linked: true };
        match old_tail {
            Some(tail) => tasks.get_mut(tail).link.next = Some(id),
            None => self.head.set(Some(id)),
        }
        self.tail.set(Some(id));
    }

    /// Prepends `id`; the task must not be linked anywhere.
    pub fn push_front(&self, tasks: &mut TaskTable, id: TaskId) {
        kernel_assert!(!tasks.get(id).link.is_linked(), "{} already on a list", id);
        let old_head = self.head.get();
        tasks.get_mut(id).link = Link { prev: None, next: old_head, linked: true };
        match old_head {
            Some(head) => tasks.get_mut(head).link.prev = Some(id),
            None => self.tail.set(Some(id)),
        }
        self.head.set(Some(id));
    }

    /// Unlinks and returns the oldest member.
    pub fn pop_front(&self, tasks: &mut TaskTable) -> Option<TaskId> {
        let head = self.head.get()?;
        self.remove(tasks, head);
        Some(head)
    }

    /// Unlinks an arbitrary member. `id` must be linked into this list.
    pub fn remove(&self, tasks: &mut TaskTable, id: TaskId) {
        let link = tasks.get(id).link;
        kernel_assert!(link.is_linked(), "{} is not on a list", id);
        match link.prev {
            Some(prev) => tasks.get_mut(prev).link.next = link.next,
            None => {
                kernel_assert!(self.head.get() == Some(id), "{} is not the head of this list", id);
                self.head.set(link.next);
            }
        }
        match link.next {
            Some(next) => tasks.get_mut(next).link.prev = link.prev,
            None => {
                kernel_assert!(self.tail.get() == Some(id), "{} is not the tail of this list", id);
                self.tail.set(link.prev);
            }
        }
        tasks.get_mut(id).link = Link::UNLINKED;
    }

    /// Walks the list from head to tail.
    pub fn iter<'a>(&self, tasks: &'a TaskTable) -> impl Iterator<Item = TaskId> + 'a {
        let mut cursor = self.head.get();
        core::iter::from_fn(move || {
            let id = cursor?;
            cursor = tasks.get(id).link.next;
            Some(id)
        })
    }
}
