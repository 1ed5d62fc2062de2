// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Kernel side IPC primitives: the ring-buffer data queue.

pub mod dqueue;
pub mod fifo;

#[cfg(test)]
mod tests_prop;

pub use dqueue::DataQueue;
pub use fifo::{storage_slots, Fifo};

/// Error returned by data queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Bad parameter, or create on an already live queue.
    #[error("invalid argument")]
    InvalidArgument,
    /// Operation not allowed from the calling context.
    #[error("operation not allowed in this context")]
    WrongContext,
    /// Queue is not live.
    #[error("queue does not exist")]
    NotExists,
    /// Queue is full.
    #[error("queue full")]
    Full,
    /// Queue is empty.
    #[error("queue empty")]
    Empty,
    /// Blocking wait expired.
    #[error("wait timed out")]
    Timeout,
    /// Queue was deleted while the caller waited.
    #[error("queue deleted while waiting")]
    Deleted,
}
