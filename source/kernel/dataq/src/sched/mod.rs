// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Scheduler context handle threaded through every kernel object operation
//! OWNERS: @kernel-sched-team
//! PUBLIC API: Kernel (new/spawn/current_task/switch_context_if_needed/yield_now/tick/exit_current), QosClass
//! DEPENDS_ON: arch::Port, sync::{CriticalSection, IrqCell}, task::{TaskTable, TaskList}
//! INVARIANTS: Running task is never on a ready list; idle task is always current or ready;
//!             higher QoS class preempts, equal classes rotate only on yield
//! ADR: docs/adr/0001-data-queue-kernel-object.md
//!
//! There is no global kernel singleton. Everything that used to be ambient
//! state (running task, pending switch) lives in [`Kernel`], and objects such
//! as data queues receive it explicitly.

use core::cell::RefMut;
use core::ptr::NonNull;

use crate::arch::Port;
use crate::config::QOS_CLASSES;
use crate::kernel_assert;
use crate::sync::{CriticalSection, IrqCell};
use crate::task::{SpawnError, TaskList, TaskState, TaskTable, WaitOutcome, WaitReason};
use crate::types::{Message, TaskId, Timeout};

/// Priority classes, lowest first.
///
/// Discriminants index the ready lists; reordering variants changes
/// scheduling behaviour.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QosClass {
    Idle = 0,
    Normal = 1,
    Interactive = 2,
    PerfBurst = 3,
}

impl QosClass {
    const DESCENDING: [QosClass; QOS_CLASSES] =
        [QosClass::PerfBurst, QosClass::Interactive, QosClass::Normal, QosClass::Idle];

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

/// Scheduler bookkeeping guarded by the kernel critical section.
pub(crate) struct SchedState {
    pub(crate) tasks: TaskTable,
    ready: [TaskList; QOS_CLASSES],
    current: TaskId,
}

impl SchedState {
    fn new() -> Self {
        let mut tasks = TaskTable::new();
        let idle = tasks.allocate(QosClass::Idle);
        kernel_assert!(idle == Ok(TaskId::IDLE), "idle task must own slot 0");
        tasks.get_mut(TaskId::IDLE).state = TaskState::RUNNABLE;
        Self {
            tasks,
            ready: [TaskList::new(), TaskList::new(), TaskList::new(), TaskList::new()],
            current: TaskId::IDLE,
        }
    }

    pub(crate) fn current(&self) -> TaskId {
        self.current
    }

    fn highest_ready(&self) -> Option<QosClass> {
        QosClass::DESCENDING.into_iter().find(|class| !self.ready[class.index()].is_empty())
    }

    fn pop_highest(&mut self) -> Option<TaskId> {
        let class = self.highest_ready()?;
        self.ready[class.index()].pop_front(&mut self.tasks)
    }

    fn make_ready(&mut self, id: TaskId) {
        let tcb = self.tasks.get_mut(id);
        tcb.state = TaskState::RUNNABLE;
        let class = tcb.qos;
        self.ready[class.index()].push_back(&mut self.tasks, id);
    }

    /// Parks the running task on `list` until someone completes its wait.
    pub(crate) fn block_current(
        &mut self,
        list: &TaskList,
        reason: WaitReason,
        timeout: Timeout,
        transfer: Option<Message>,
    ) {
        let id = self.current;
        kernel_assert!(!id.is_idle(), "idle task cannot block");
        let tcb = self.tasks.get_mut(id);
        tcb.state = TaskState::WAIT;
        tcb.wait_reason = Some(reason);
        tcb.timeout = (!timeout.is_infinite()).then_some(timeout.as_ticks());
        tcb.outcome = WaitOutcome::Pending;
        tcb.transfer = transfer;
        tcb.wait_list = Some(NonNull::from(list));
        list.push_back(&mut self.tasks, id);
    }

    /// Makes a waiting task runnable with `outcome`.
    ///
    /// The caller has already unlinked `id` from its wait list.
    pub(crate) fn complete_wait(&mut self, id: TaskId, outcome: WaitOutcome) {
        let tcb = self.tasks.get_mut(id);
        kernel_assert!(tcb.is_waiting(), "{} is not waiting", id);
        kernel_assert!(!tcb.link.is_linked(), "{} still on its wait list", id);
        tcb.wait_reason = None;
        tcb.timeout = None;
        tcb.wait_list = None;
        tcb.outcome = outcome;
        self.make_ready(id);
    }

    pub(crate) fn put_transfer(&mut self, id: TaskId, msg: Message) {
        self.tasks.get_mut(id).transfer = Some(msg);
    }

    pub(crate) fn take_transfer(&mut self, id: TaskId) -> Option<Message> {
        self.tasks.get_mut(id).transfer.take()
    }

    /// Consumes the wait result left on the running task by its waker.
    fn finish_wait(&mut self) -> (WaitOutcome, Option<Message>) {
        let tcb = self.tasks.get_mut(self.current);
        let outcome = core::mem::replace(&mut tcb.outcome, WaitOutcome::Pending);
        (outcome, tcb.transfer.take())
    }

    /// True when the running task must give up the CPU.
    pub(crate) fn need_switch(&self) -> bool {
        let Some(best) = self.highest_ready() else {
            return false;
        };
        let current = self.tasks.get(self.current);
        !current.state.contains(TaskState::RUNNABLE) || best > current.qos
    }

    /// Chooses the next task if a switch is needed and makes it current.
    fn preempt(&mut self) -> Option<(TaskId, TaskId)> {
        if !self.need_switch() {
            return None;
        }
        let from = self.current;
        let tcb = self.tasks.get(from);
        if tcb.state.contains(TaskState::RUNNABLE) {
            // Preempted tasks keep their turn within the class.
            let class = tcb.qos;
            self.ready[class.index()].push_front(&mut self.tasks, from);
        }
        let to = self.pop_highest()?;
        self.current = to;
        Some((from, to))
    }

    /// Round-robin hand-over to the next ready task of equal or higher class.
    fn rotate(&mut self) -> Option<(TaskId, TaskId)> {
        let from = self.current;
        let class = self.tasks.get(from).qos;
        if self.highest_ready()? < class {
            return None;
        }
        self.ready[class.index()].push_back(&mut self.tasks, from);
        let to = self.pop_highest()?;
        self.current = to;
        Some((from, to))
    }

    /// Retires the running task and returns its successor.
    fn retire_current(&mut self) -> TaskId {
        let from = self.current;
        kernel_assert!(!from.is_idle(), "idle task cannot exit");
        self.tasks.get_mut(from).state = TaskState::DORMANT;
        match self.pop_highest() {
            Some(to) => {
                self.current = to;
                to
            }
            None => crate::diag::fatal(format_args!("no runnable task after {} exited", from)),
        }
    }

    /// Advances every finite wait by one tick; returns how many expired.
    fn tick(&mut self) -> usize {
        let mut expired = 0;
        for id in self.tasks.ids() {
            let tcb = self.tasks.get_mut(id);
            if !tcb.is_waiting() {
                continue;
            }
            let Some(left) = tcb.timeout else {
                continue;
            };
            let left = left.saturating_sub(1);
            tcb.timeout = Some(left);
            if left > 0 {
                continue;
            }
            if let Some(list) = tcb.wait_list {
                // SAFETY: the task is still linked into `list` (it is waiting),
                // and the owning object cannot move while its waiter is blocked.
                let list = unsafe { list.as_ref() };
                list.remove(&mut self.tasks, id);
            }
            self.complete_wait(id, WaitOutcome::Timeout);
            log::trace!(target: "dataq::sched", "{} wait expired", id);
            expired += 1;
        }
        expired
    }
}

/// Scheduler context: the running task, ready lists and the CPU port.
pub struct Kernel<P: Port> {
    port: P,
    sched: IrqCell<SchedState>,
}

impl<P: Port> Kernel<P> {
    /// Creates a kernel whose idle task is the caller's context.
    pub fn new(port: P) -> Self {
        Self { port, sched: IrqCell::new(SchedState::new()) }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Task-context critical section.
    pub(crate) fn critical(&self) -> CriticalSection<'_> {
        CriticalSection::enter(&self.port)
    }

    /// Interrupt-context critical section.
    pub(crate) fn critical_from_isr(&self) -> CriticalSection<'_> {
        CriticalSection::enter_nested(&self.port)
    }

    /// Critical section suited to whichever context the caller runs in.
    pub(crate) fn critical_any(&self) -> CriticalSection<'_> {
        if self.in_interrupt() {
            self.critical_from_isr()
        } else {
            self.critical()
        }
    }

    pub(crate) fn sched<'cs>(&'cs self, cs: &'cs CriticalSection<'_>) -> RefMut<'cs, SchedState> {
        self.sched.borrow_mut(cs)
    }

    pub fn in_interrupt(&self) -> bool {
        self.port.in_interrupt()
    }

    pub fn current_task(&self) -> TaskId {
        let cs = self.critical_any();
        let current = self.sched(&cs).current();
        current
    }

    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        let cs = self.critical_any();
        let state = self.sched(&cs).tasks.state(id);
        state
    }

    /// What `id` is blocked on, if it is blocked.
    pub fn wait_reason(&self, id: TaskId) -> Option<WaitReason> {
        let cs = self.critical_any();
        let sched = self.sched(&cs);
        let reason = if sched.tasks.contains(id) { sched.tasks.get(id).wait_reason } else { None };
        reason
    }

    /// Creates a runnable task in class `qos`.
    ///
    /// The new task does not preempt the caller until the next switch point.
    pub fn spawn(&self, qos: QosClass) -> Result<TaskId, SpawnError> {
        let cs = self.critical_any();
        let mut sched = self.sched(&cs);
        let id = sched.tasks.allocate(qos)?;
        sched.make_ready(id);
        log::debug!(target: "dataq::sched", "spawn {} qos={:?}", id, qos);
        Ok(id)
    }

    /// Switches away if a higher class became ready or the caller blocked.
    ///
    /// No-op inside interrupt handlers; the port switches on interrupt exit.
    pub fn switch_context_if_needed(&self) {
        if self.in_interrupt() {
            return;
        }
        let switch = {
            let cs = self.critical();
            let switch = self.sched(&cs).preempt();
            switch
        };
        if let Some((from, to)) = switch {
            log::trace!(target: "dataq::sched", "switch {} -> {}", from, to);
            self.port.switch_to(from, to);
        }
    }

    /// Gives the CPU to the next ready task of equal or higher class.
    pub fn yield_now(&self) {
        if self.in_interrupt() {
            return;
        }
        let switch = {
            let cs = self.critical();
            let switch = self.sched(&cs).rotate();
            switch
        };
        if let Some((from, to)) = switch {
            log::trace!(target: "dataq::sched", "yield {} -> {}", from, to);
            self.port.switch_to(from, to);
        }
    }

    /// Timer interrupt bookkeeping: expires waits whose timeout ran out.
    ///
    /// Expired tasks are unlinked from their wait list and resume with a
    /// timeout result. Returns the number of expired waits.
    pub fn tick(&self) -> usize {
        let cs = self.critical_from_isr();
        let expired = self.sched(&cs).tick();
        expired
    }

    /// Retires the running task and returns the task the port must resume.
    pub fn exit_current(&self) -> TaskId {
        let cs = self.critical();
        let next = self.sched(&cs).retire_current();
        log::trace!(target: "dataq::sched", "exit -> {}", next);
        next
    }

    /// Consumes the running task's wait result after it resumes.
    pub(crate) fn finish_wait(&self) -> (WaitOutcome, Option<Message>) {
        let cs = self.critical();
        let result = self.sched(&cs).finish_wait();
        result
    }
}
