// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Compile-time kernel sizing knobs
//! OWNERS: @kernel-team
//! PUBLIC API: MAX_TASKS, QOS_CLASSES, CONSISTENCY_CHECKS
//! DEPENDS_ON: Cargo features (`consistency-checks`)
//! INVARIANTS: Task table holds the idle task plus at least one user task
//! ADR: docs/adr/0001-data-queue-kernel-object.md

/// Number of task control blocks, idle task included.
pub const MAX_TASKS: usize = 16;

/// Number of scheduler priority classes (see `sched::QosClass`).
pub const QOS_CLASSES: usize = 4;

/// Whether fatal internal-consistency assertions are compiled in.
pub const CONSISTENCY_CHECKS: bool = cfg!(feature = "consistency-checks");

static_assertions::const_assert!(MAX_TASKS >= 2);
static_assertions::const_assert!(MAX_TASKS <= u32::MAX as usize);
static_assertions::const_assert_eq!(QOS_CLASSES, 4);
