// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Data queue kernel object and the scheduler pieces it runs on
//! OWNERS: @kernel-ipc-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit + property tests in-crate; blocking scenarios in dataq-sim
//! PUBLIC API: DataQueue, Fifo, Kernel, Port, QueueError, TaskId, Message, Timeout
//! DEPENDS_ON: bitflags, log, static_assertions, thiserror
//! INVARIANTS: No heap allocation; all shared state lives behind CriticalSection
//! ADR: docs/adr/0001-data-queue-kernel-object.md
//!
//! Queues and their storage are owned by the caller. Every operation takes
//! the [`Kernel`] handle so the scheduler state stays explicit.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod arch;
pub mod config;
pub mod diag;
pub mod ipc;
pub mod sched;
pub mod sync;
pub mod task;
pub mod types;

pub use arch::Port;
pub use ipc::{storage_slots, DataQueue, Fifo, QueueError};
pub use sched::{Kernel, QosClass};
pub use sync::{CriticalSection, IrqMask, IrqState};
pub use task::{SpawnError, TaskState, WaitReason};
pub use types::{Message, TaskId, Timeout};
