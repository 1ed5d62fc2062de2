// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Port boundary between the portable kernel and a CPU/host backend
//! OWNERS: @kernel-team
//! PUBLIC API: Port
//! DEPENDS_ON: sync::IrqMask
//! INVARIANTS: switch_to only returns once `from` is scheduled again
//! ADR: docs/adr/0001-data-queue-kernel-object.md

use crate::sync::IrqMask;
use crate::types::TaskId;

/// Everything the kernel needs from the CPU it runs on.
pub trait Port: IrqMask + Sync {
    /// Returns `true` while executing an interrupt handler.
    fn in_interrupt(&self) -> bool;

    /// Saves the context of `from`, resumes `to`, and returns when `from`
    /// is switched back in. Called with interrupts unmasked.
    fn switch_to(&self, from: TaskId, to: TaskId);
}
