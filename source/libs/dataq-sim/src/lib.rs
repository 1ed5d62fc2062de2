// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Host port and uniprocessor simulator for the dataq kernel crate
//! OWNERS: @runtime
//! PUBLIC API: HostPort, Simulator (spawn/run/interrupt/tick/finish), Probe, leak_storage()
//! DEPENDS_ON: dataq, parking_lot (baton mutex/condvar), log
//! INVARIANTS: Exactly one simulated context holds the baton and runs at any time;
//!             the thread driving the simulator is the idle task
//! ADR: docs/adr/0001-data-queue-kernel-object.md
//!
//! Every simulated task is an OS thread. A context switch hands a baton to the
//! target thread and parks the caller until the baton comes back, so real
//! blocking calls can be exercised on the host with uniprocessor semantics.
//! Interrupts are modelled by running a closure on the idle thread with the
//! interrupt flag raised; the deferred switch happens on "interrupt exit".

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use dataq::{IrqMask, IrqState, Kernel, Message, Port, QosClass, SpawnError, TaskId};
use parking_lot::{Condvar, Mutex};

/// Errors reported by the simulator.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("spawn failed: {0}")]
    Spawn(#[from] SpawnError),
    #[error("could not start task thread: {0}")]
    Thread(#[from] std::io::Error),
    #[error("simulated task panicked: {0}")]
    TaskPanicked(String),
}

/// Port whose "CPU" is a baton passed between threads.
pub struct HostPort {
    masked: AtomicBool,
    in_isr: AtomicBool,
    baton: Mutex<TaskId>,
    turn: Condvar,
}

impl HostPort {
    pub fn new() -> Self {
        Self {
            masked: AtomicBool::new(false),
            in_isr: AtomicBool::new(false),
            baton: Mutex::new(TaskId::IDLE),
            turn: Condvar::new(),
        }
    }

    fn wait_turn(&self, id: TaskId) {
        let mut baton = self.baton.lock();
        while *baton != id {
            self.turn.wait(&mut baton);
        }
    }

    fn hand_off(&self, to: TaskId) {
        *self.baton.lock() = to;
        self.turn.notify_all();
    }

    fn set_in_interrupt(&self, in_isr: bool) {
        self.in_isr.store(in_isr, Ordering::SeqCst);
    }
}

impl Default for HostPort {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqMask for HostPort {
    fn disable(&self) {
        let was_masked = self.masked.swap(true, Ordering::SeqCst);
        assert!(!was_masked, "task-context critical sections must not nest");
    }

    fn enable(&self) {
        self.masked.store(false, Ordering::SeqCst);
    }

    fn disable_nested(&self) -> IrqState {
        IrqState::new(self.masked.swap(true, Ordering::SeqCst))
    }

    fn restore_nested(&self, saved: IrqState) {
        self.masked.store(saved.was_masked(), Ordering::SeqCst);
    }
}

impl Port for HostPort {
    fn in_interrupt(&self) -> bool {
        self.in_isr.load(Ordering::SeqCst)
    }

    fn switch_to(&self, from: TaskId, to: TaskId) {
        let mut baton = self.baton.lock();
        *baton = to;
        self.turn.notify_all();
        while *baton != from {
            self.turn.wait(&mut baton);
        }
    }
}

/// Drives a kernel whose idle task is the calling thread.
pub struct Simulator {
    kernel: Arc<Kernel<HostPort>>,
    failures: Arc<Mutex<Vec<String>>>,
}

impl Simulator {
    pub fn new() -> Self {
        Self { kernel: Arc::new(Kernel::new(HostPort::new())), failures: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn kernel(&self) -> &Kernel<HostPort> {
        &self.kernel
    }

    /// Creates a task running `body`. It first runs at the next switch point.
    pub fn spawn<F>(&self, qos: QosClass, body: F) -> Result<TaskId, SimError>
    where
        F: FnOnce(&Kernel<HostPort>) + Send + 'static,
    {
        let id = self.kernel.spawn(qos)?;
        let kernel = Arc::clone(&self.kernel);
        let failures = Arc::clone(&self.failures);
        thread::Builder::new().name(id.to_string()).spawn(move || {
            kernel.port().wait_turn(id);
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| body(&*kernel))) {
                failures.lock().push(format!("{}: {}", id, panic_message(payload.as_ref())));
            }
            let next = kernel.exit_current();
            kernel.port().hand_off(next);
        })?;
        log::debug!(target: "dataq::sim", "spawned {} ({:?})", id, qos);
        Ok(id)
    }

    /// Lets every ready task run until all of them block or exit.
    pub fn run(&self) {
        self.kernel.yield_now();
    }

    /// Runs `handler` in interrupt context, then performs the deferred switch.
    pub fn interrupt<R>(&self, handler: impl FnOnce(&Kernel<HostPort>) -> R) -> R {
        let port = self.kernel.port();
        port.set_in_interrupt(true);
        let result = handler(&self.kernel);
        port.set_in_interrupt(false);
        self.kernel.switch_context_if_needed();
        result
    }

    /// Delivers one timer interrupt.
    pub fn tick(&self) -> usize {
        self.interrupt(|kernel| kernel.tick())
    }

    pub fn ticks(&self, count: u32) {
        for _ in 0..count {
            self.tick();
        }
    }

    /// Reports panics raised inside simulated tasks.
    pub fn finish(self) -> Result<(), SimError> {
        let failures = self.failures.lock();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SimError::TaskPanicked(failures.join("; ")))
        }
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Write-once result slot shared between a test and a simulated task.
pub struct Probe<T>(Arc<Mutex<Option<T>>>);

impl<T> Probe<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }

    pub fn set(&self, value: T) {
        *self.0.lock() = Some(value);
    }

    pub fn is_set(&self) -> bool {
        self.0.lock().is_some()
    }
}

impl<T: Clone> Probe<T> {
    pub fn get(&self) -> Option<T> {
        self.0.lock().clone()
    }
}

impl<T> Clone for Probe<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Default for Probe<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage for a queue of `capacity` messages that lives for the whole test.
pub fn leak_storage(capacity: usize) -> &'static mut [Message] {
    Box::leak(vec![Message::default(); dataq::storage_slots(capacity)].into_boxed_slice())
}
