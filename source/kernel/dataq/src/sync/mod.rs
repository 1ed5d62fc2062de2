// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Interrupt-mask critical sections for kernel shared state
//! OWNERS: @kernel-sync-team
//! PUBLIC API: IrqMask, IrqState, CriticalSection (enter/enter_nested), IrqCell
//! DEPENDS_ON: arch port (mask implementation)
//! INVARIANTS: Mask restored on every exit path; IrqCell contents reachable only under a token
//! ADR: docs/adr/0001-data-queue-kernel-object.md
//!
//! The kernel has no mutexes. Shared state is protected by masking
//! interrupts on a single CPU, which also stops the scheduler from
//! preempting the holder. Task code uses the plain disable/enable pair;
//! interrupt handlers may run while task code already holds the mask, so
//! they save the previous state and restore it instead.

use core::cell::{RefCell, RefMut};
use core::marker::PhantomData;

/// Interrupt-mask primitives provided by the port.
pub trait IrqMask {
    /// Masks interrupts from task context. Calls never nest.
    fn disable(&self);
    /// Unmasks interrupts after [`IrqMask::disable`].
    fn enable(&self);
    /// Masks interrupts from interrupt context and returns the previous state.
    fn disable_nested(&self) -> IrqState;
    /// Restores the state saved by [`IrqMask::disable_nested`].
    fn restore_nested(&self, saved: IrqState);
}

/// Mask state captured on nested entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "the saved mask state must be restored"]
pub struct IrqState {
    was_masked: bool,
}

impl IrqState {
    pub const fn new(was_masked: bool) -> Self {
        Self { was_masked }
    }

    pub const fn was_masked(self) -> bool {
        self.was_masked
    }
}

/// Proof that interrupts are masked; unmasks (or restores) on drop.
///
/// The token is `!Send`: a critical section belongs to the
/// execution context that opened it.
pub struct CriticalSection<'a> {
    mask: &'a dyn IrqMask,
    saved: Option<IrqState>,
    _not_send: PhantomData<*mut ()>,
}

impl<'a> CriticalSection<'a> {
    /// Enters a task-context critical section.
    pub fn enter(mask: &'a dyn IrqMask) -> Self {
        mask.disable();
        Self { mask, saved: None, _not_send: PhantomData }
    }

    /// Enters an interrupt-context critical section, remembering the prior mask.
    pub fn enter_nested(mask: &'a dyn IrqMask) -> Self {
        let saved = mask.disable_nested();
        Self { mask, saved: Some(saved), _not_send: PhantomData }
    }

    pub fn is_nested(&self) -> bool {
        self.saved.is_some()
    }
}

impl Drop for CriticalSection<'_> {
    fn drop(&mut self) {
        match self.saved.take() {
            Some(saved) => self.mask.restore_nested(saved),
            None => self.mask.enable(),
        }
    }
}

static_assertions::assert_not_impl_any!(CriticalSection<'static>: Send, Sync);

/// Cell whose contents are only reachable while a [`CriticalSection`] is held.
pub struct IrqCell<T> {
    inner: RefCell<T>,
}

// SAFETY: every access goes through `borrow_mut`, which demands a live
// critical section. With interrupts masked on the only CPU no other context
// can observe the cell, and the port's mask orders memory between contexts.
unsafe impl<T: Send> Sync for IrqCell<T> {}

impl<T> IrqCell<T> {
    pub const fn new(value: T) -> Self {
        Self { inner: RefCell::new(value) }
    }

    /// Borrows the contents for the lifetime of the critical section borrow.
    ///
    /// Overlapping borrows of the same cell are a kernel bug and panic.
    pub fn borrow_mut<'cs>(&'cs self, _cs: &'cs CriticalSection<'_>) -> RefMut<'cs, T> {
        self.inner.borrow_mut()
    }
}
