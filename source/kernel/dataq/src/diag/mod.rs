// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Fatal internal-consistency reporting
//! OWNERS: @kernel-team
//! PUBLIC API: fatal(), kernel_assert!
//! DEPENDS_ON: log facade
//! INVARIANTS: Only broken kernel invariants end up here, never caller mistakes
//! ADR: docs/adr/0001-data-queue-kernel-object.md

/// Logs the broken invariant and halts the system.
#[cold]
#[inline(never)]
pub fn fatal(args: core::fmt::Arguments<'_>) -> ! {
    log::error!(target: "dataq::diag", "FATAL: {}", args);
    panic!("dataq fatal: {}", args);
}

/// Asserts a kernel invariant when `consistency-checks` is enabled.
///
/// With the feature disabled the condition is not evaluated.
#[macro_export]
macro_rules! kernel_assert {
    ($cond:expr $(,)?) => {
        if $crate::config::CONSISTENCY_CHECKS && !$cond {
            $crate::diag::fatal(format_args!(concat!("assertion failed: ", stringify!($cond))));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if $crate::config::CONSISTENCY_CHECKS && !$cond {
            $crate::diag::fatal(format_args!($($arg)+));
        }
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn passing_assert_is_silent() {
        kernel_assert!(1 + 1 == 2);
        kernel_assert!(true, "never printed {}", 0);
    }

    #[test]
    #[cfg_attr(feature = "consistency-checks", should_panic(expected = "dataq fatal"))]
    fn failing_assert_is_fatal_when_enabled() {
        kernel_assert!(false, "wait list corrupted at {}", 3);
    }
}
