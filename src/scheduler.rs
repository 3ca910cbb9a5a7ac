//! # Scheduler
//!
//! Core scheduling logic for SemGuard. Implements a preemptive,
//! priority-based scheduler with round-robin time slicing between tasks of
//! equal priority, tick-based delays, and binary semaphores with
//! blocking-with-timeout acquisition.
//!
//! Everything here is plain state manipulation: the kernel wraps each call
//! in a critical section and the arch layer performs the actual context
//! switch, so the whole policy is testable on the host.
//!
//! ## Scheduling Algorithm
//!
//! At each SysTick interrupt:
//! 1. **Advance time**: Increment the tick counter
//! 2. **Wake sleepers**: Blocked tasks whose wake tick has passed become
//!    Ready; a semaphore wait that expires this way ends as `TimedOut`
//! 3. **Decrement time slice**: If expired, request a reschedule
//! 4. **Preemption**: Waking a task of higher priority than the running
//!    one requests a reschedule
//!
//! `schedule()` then picks the highest-priority runnable task. Among tasks of
//! equal priority it scans in circular order starting after the current task,
//! which yields round-robin behaviour for both time-slice expiry and
//! voluntary yields.

use crate::config::{MAX_TASKS, STACK_SIZE, WAIT_FOREVER};
use crate::error::KernelError;
use crate::semaphore::{SemaphoreHandle, SemaphoreTable};
use crate::task::{TaskConfig, TaskControlBlock, TaskEntry, TaskId, TaskState, WaitResult};

/// Immediate outcome of a semaphore take request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeStatus {
    /// The semaphore was available and is now held by the caller.
    Acquired,
    /// The caller is now Blocked; read the outcome with `finish_take()`
    /// once it runs again.
    Blocked,
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state. Holds all task control blocks, the
/// semaphore table, and the tick counter. Stored as a global `static mut`
/// in `kernel.rs`.
///
/// ## Design Notes
///
/// - All tasks are stored inline in a fixed-size array (no heap)
/// - `current_task` tracks the index of the currently running task
/// - The kernel creates an idle task first, so index 0 is always runnable
pub struct Scheduler {
    /// Fixed-size array of TCBs.
    pub tasks: [TaskControlBlock; MAX_TASKS],

    /// Index of the currently running task.
    pub current_task: usize,

    /// Number of allocated tasks.
    pub task_count: usize,

    /// Binary semaphores owned by the kernel.
    pub semaphores: SemaphoreTable,

    /// Monotonic tick counter.
    pub tick_count: u64,

    /// Flag set when a context switch should occur.
    pub needs_reschedule: bool,
}

impl Scheduler {
    /// Create an empty scheduler.
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            current_task: 0,
            task_count: 0,
            semaphores: SemaphoreTable::new(),
            tick_count: 0,
            needs_reschedule: false,
        }
    }

    /// Register a new task with the scheduler.
    ///
    /// # Returns
    /// - `Ok(task_id)`: the index of the newly created task
    /// - `Err(KernelError::TaskTableFull)`: if the task array is full
    pub fn create_task(
        &mut self,
        entry: TaskEntry,
        arg: usize,
        config: TaskConfig,
    ) -> Result<TaskId, KernelError> {
        if self.task_count >= MAX_TASKS {
            return Err(KernelError::TaskTableFull);
        }

        let id = self.task_count;
        self.tasks[id].init(id, config);

        // Initialize the stack frame for context switching
        init_task_stack(&mut self.tasks[id], entry, arg);

        self.task_count += 1;
        Ok(id)
    }

    fn task(&self, id: TaskId) -> Result<&TaskControlBlock, KernelError> {
        match self.tasks.get(id) {
            Some(tcb) if id < self.task_count && tcb.active => Ok(tcb),
            _ => Err(KernelError::InvalidTask),
        }
    }

    fn current_priority(&self) -> u8 {
        self.tasks[self.current_task].priority()
    }

    /// Called from the SysTick handler every tick.
    ///
    /// Wakes expired sleepers, decrements the running task's time slice, and
    /// sets `needs_reschedule` if a context switch should occur.
    pub fn tick(&mut self) {
        self.tick_count += 1;
        let now = self.tick_count;
        let current = self.current_task;
        let current_prio = self.current_priority();

        // --- Wake tasks whose delay or block time has run out ---
        for i in 0..self.task_count {
            let tcb = &mut self.tasks[i];
            if !tcb.active || tcb.state != TaskState::Blocked {
                continue;
            }
            if matches!(tcb.wake_tick, Some(wake) if wake <= now) {
                tcb.unblock(WaitResult::TimedOut);
                if tcb.priority() > current_prio {
                    self.needs_reschedule = true;
                }
            }
        }

        // --- Time slice accounting for the running task ---
        if current < self.task_count && self.tasks[current].state == TaskState::Running {
            let tcb = &mut self.tasks[current];
            tcb.total_ticks = tcb.total_ticks.wrapping_add(1);
            tcb.ticks_remaining = tcb.ticks_remaining.saturating_sub(1);

            // Time slice expired → let equal-priority peers in
            if tcb.ticks_remaining == 0 {
                tcb.reload_slice();
                self.needs_reschedule = true;
            }
        }
    }

    /// Select the next task to run.
    ///
    /// Picks the highest-priority runnable task. Ties go to the first task in
    /// circular order after the current one, so the current task is chosen
    /// again only if no equal-priority peer is ready.
    ///
    /// # Returns
    /// Index of the next task to run.
    pub fn schedule(&mut self) -> usize {
        let count = self.task_count;
        if count == 0 {
            return 0;
        }

        let current = self.current_task;
        let mut best: Option<usize> = None;

        for offset in 1..=count {
            let i = (current + offset) % count;
            if !self.tasks[i].is_runnable() {
                continue;
            }
            match best {
                Some(b) if self.tasks[i].priority() <= self.tasks[b].priority() => {}
                _ => best = Some(i),
            }
        }

        let next = best.unwrap_or(current);

        // Mark previous task as Ready (if it was Running)
        if next != current && self.tasks[current].state == TaskState::Running {
            self.tasks[current].state = TaskState::Ready;
        }

        // Mark new task as Running
        if self.tasks[next].is_runnable() {
            self.tasks[next].state = TaskState::Running;
        }

        self.current_task = next;
        self.needs_reschedule = false;

        next
    }

    /// Give up the rest of the current time slice.
    pub fn yield_current(&mut self) {
        let current = self.current_task;
        if current < self.task_count && self.tasks[current].active {
            self.tasks[current].reload_slice();
            self.needs_reschedule = true;
        }
    }

    /// Block the current task for `ticks` ticks. Zero ticks is a yield.
    pub fn delay_current(&mut self, ticks: u32) {
        if ticks == 0 {
            self.yield_current();
            return;
        }
        let now = self.tick_count;
        let current = self.current_task;
        self.tasks[current].block(Some(now + ticks as u64), None, now);
        self.needs_reschedule = true;
    }

    /// Allocate a binary semaphore in the available state.
    pub fn create_semaphore(&mut self) -> Result<SemaphoreHandle, KernelError> {
        self.semaphores.create_binary()
    }

    /// Take `handle` on behalf of the current task.
    ///
    /// A zero `timeout` never blocks and fails with `WouldBlock`. Otherwise
    /// an unavailable semaphore blocks the caller for at most `timeout` ticks
    /// (`WAIT_FOREVER` disables the timeout).
    pub fn take(&mut self, handle: SemaphoreHandle, timeout: u32) -> Result<TakeStatus, KernelError> {
        match self.semaphores.try_take(handle) {
            Ok(()) => Ok(TakeStatus::Acquired),
            Err(KernelError::WouldBlock) if timeout > 0 => {
                let now = self.tick_count;
                let wake = if timeout == WAIT_FOREVER {
                    None
                } else {
                    Some(now + timeout as u64)
                };
                let current = self.current_task;
                self.tasks[current].block(wake, Some(handle), now);
                self.needs_reschedule = true;
                Ok(TakeStatus::Blocked)
            }
            Err(e) => Err(e),
        }
    }

    /// Collect the outcome of the current task's last blocking take.
    pub fn finish_take(&mut self) -> Result<(), KernelError> {
        let tcb = &mut self.tasks[self.current_task];
        let result = core::mem::replace(&mut tcb.wait_result, WaitResult::Pending);
        match result {
            WaitResult::Granted => Ok(()),
            WaitResult::TimedOut | WaitResult::Pending => Err(KernelError::Timeout),
        }
    }

    /// Give `handle` back.
    ///
    /// If tasks are blocked on it, ownership passes directly to the
    /// highest-priority waiter (longest-waiting among equals) and the
    /// semaphore stays taken. Giving an available semaphore is rejected
    /// with `NotHeld`.
    pub fn give(&mut self, handle: SemaphoreHandle) -> Result<(), KernelError> {
        self.semaphores.validate(handle)?;

        let mut waiter: Option<usize> = None;
        for i in 0..self.task_count {
            let tcb = &self.tasks[i];
            if !tcb.active || tcb.state != TaskState::Blocked || tcb.waiting_on != Some(handle) {
                continue;
            }
            waiter = match waiter {
                Some(w) => {
                    let best = &self.tasks[w];
                    if tcb.priority() > best.priority()
                        || (tcb.priority() == best.priority() && tcb.blocked_since < best.blocked_since)
                    {
                        Some(i)
                    } else {
                        Some(w)
                    }
                }
                None => Some(i),
            };
        }

        match waiter {
            Some(w) => {
                self.tasks[w].unblock(WaitResult::Granted);
                if self.tasks[w].priority() > self.current_priority() {
                    self.needs_reschedule = true;
                }
                Ok(())
            }
            None => self.semaphores.release(handle),
        }
    }

    /// Hold a task out of scheduling. A pending semaphore wait ends as
    /// `TimedOut`.
    pub fn suspend(&mut self, id: TaskId) -> Result<(), KernelError> {
        self.task(id)?;
        let tcb = &mut self.tasks[id];
        if tcb.state == TaskState::Blocked {
            tcb.unblock(WaitResult::TimedOut);
        }
        tcb.state = TaskState::Suspended;
        if id == self.current_task {
            self.needs_reschedule = true;
        }
        Ok(())
    }

    /// Return a suspended task to the Ready state.
    pub fn resume(&mut self, id: TaskId) -> Result<(), KernelError> {
        self.task(id)?;
        let current_prio = self.current_priority();
        let tcb = &mut self.tasks[id];
        if tcb.state == TaskState::Suspended {
            tcb.state = TaskState::Ready;
            if tcb.priority() > current_prio {
                self.needs_reschedule = true;
            }
        }
        Ok(())
    }

    /// Get a reference to the current task's TCB.
    pub fn current_tcb(&self) -> &TaskControlBlock {
        &self.tasks[self.current_task]
    }
}

// ---------------------------------------------------------------------------
// Stack initialization helper
// ---------------------------------------------------------------------------

/// Initialize a task's stack frame for first-time context switch.
///
/// The Cortex-M4 hardware automatically pushes an exception frame on
/// interrupt entry. We pre-populate this frame on the task's stack so
/// that the first PendSV "return" starts executing the task function with
/// `arg` in R0.
///
/// ## Stack Layout (top = high address, growing down)
///
/// ```text
/// [Hardware stacked frame]   <- initial PSP points here
///   xPSR  (Thumb bit set)
///   PC    (task entry point)
///   LR    (task_exit)
///   R12   (0)
///   R3    (0)
///   R2    (0)
///   R1    (0)
///   R0    (arg)
/// [Software saved context]
///   R11   (0)
///   R10   (0)
///   R9    (0)
///   R8    (0)
///   R7    (0)
///   R6    (0)
///   R5    (0)
///   R4    (0)              <- stack_pointer after init
/// ```
fn init_task_stack(tcb: &mut TaskControlBlock, entry: TaskEntry, arg: usize) {
    // Align to 8 bytes (AAPCS requirement)
    let aligned_top = tcb.stack.top() & !0x07;
    debug_assert!(aligned_top - tcb.stack.0.as_ptr() as usize <= STACK_SIZE);

    // We need space for 16 registers (8 HW + 8 SW)
    let frame_ptr = (aligned_top - 16 * 4) as *mut u32;

    unsafe {
        // Software-saved registers (R4–R11), bottom of frame
        for i in 0..8 {
            *frame_ptr.add(i) = 0;
        }

        // Hardware-stacked frame (R0–R3, R12, LR, PC, xPSR)
        *frame_ptr.add(8) = arg as u32; // R0: task argument
        *frame_ptr.add(9) = 0; // R1
        *frame_ptr.add(10) = 0; // R2
        *frame_ptr.add(11) = 0; // R3
        *frame_ptr.add(12) = 0; // R12
        *frame_ptr.add(13) = task_exit as usize as u32; // LR: return address if task returns
        *frame_ptr.add(14) = (entry as usize as u32) & !1; // PC: exception return wants bit 0 clear
        *frame_ptr.add(15) = 0x0100_0000; // xPSR: Thumb bit set
    }

    tcb.stack_pointer = frame_ptr;
}

/// Fallback for tasks that return (they can't, entry is `fn(usize) -> !`).
extern "C" fn task_exit() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TIME_SLICE;

    extern "C" fn dummy_task(_arg: usize) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    /// Scheduler with an idle task at priority 0 plus one task per entry in
    /// `priorities`, started the way the kernel starts it.
    fn scheduler_with(priorities: &[u8]) -> Scheduler {
        let mut s = Scheduler::new();
        s.create_task(dummy_task, 0, TaskConfig::new("IDLE", 0)).unwrap();
        for (i, &p) in priorities.iter().enumerate() {
            s.create_task(dummy_task, i + 1, TaskConfig::new("T", p)).unwrap();
        }
        s.schedule();
        s
    }

    fn run_ticks(s: &mut Scheduler, n: u32) {
        for _ in 0..n {
            s.tick();
            if s.needs_reschedule {
                s.schedule();
            }
        }
    }

    #[test]
    fn test_task_table_full() {
        let mut s = Scheduler::new();
        for i in 0..MAX_TASKS {
            assert_eq!(s.create_task(dummy_task, i, TaskConfig::new("T", 1)), Ok(i));
        }
        assert_eq!(
            s.create_task(dummy_task, 0, TaskConfig::new("T", 1)),
            Err(KernelError::TaskTableFull)
        );
    }

    #[test]
    fn test_highest_priority_runs_first() {
        let s = scheduler_with(&[1, 3, 2]);
        assert_eq!(s.current_task, 2);
        assert_eq!(s.tasks[2].state, TaskState::Running);
        assert_eq!(s.tasks[0].state, TaskState::Ready);
    }

    #[test]
    fn test_round_robin_on_yield() {
        // Idle plus two idle-priority peers rotate in order
        let mut s = scheduler_with(&[0, 0]);
        let first = s.current_task;
        s.yield_current();
        let second = s.schedule();
        s.yield_current();
        let third = s.schedule();
        s.yield_current();
        let fourth = s.schedule();

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_ne!(first, third);
        assert_eq!(fourth, first);
    }

    #[test]
    fn test_time_slice_rotation() {
        let mut s = scheduler_with(&[1, 1]);
        let first = s.current_task;
        run_ticks(&mut s, DEFAULT_TIME_SLICE - 1);
        assert_eq!(s.current_task, first);
        run_ticks(&mut s, 1);
        assert_ne!(s.current_task, first);
        assert_ne!(s.current_task, 0);
    }

    #[test]
    fn test_delay_blocks_until_wake_tick() {
        let mut s = scheduler_with(&[2]);
        assert_eq!(s.current_task, 1);

        s.delay_current(5);
        assert_eq!(s.tasks[1].state, TaskState::Blocked);
        assert_eq!(s.schedule(), 0);

        run_ticks(&mut s, 4);
        assert_eq!(s.current_task, 0);
        run_ticks(&mut s, 1);
        assert_eq!(s.current_task, 1);
    }

    #[test]
    fn test_delay_owes_exactly_one_switch() {
        let mut s = scheduler_with(&[2, 2]);
        let sleeper = s.current_task;

        s.delay_current(3);
        assert!(s.needs_reschedule);
        let peer = s.schedule();
        assert_ne!(peer, sleeper);
        assert!(!s.needs_reschedule);

        // An equal-priority sleeper waking up does not preempt the peer
        for _ in 0..3 {
            s.tick();
            assert!(!s.needs_reschedule);
        }
        assert_eq!(s.tasks[sleeper].state, TaskState::Ready);
        assert_eq!(s.current_task, peer);
    }

    #[test]
    fn test_zero_delay_is_yield() {
        let mut s = scheduler_with(&[0]);
        let first = s.current_task;
        s.delay_current(0);
        assert_ne!(s.tasks[first].state, TaskState::Blocked);
        assert_ne!(s.schedule(), first);
    }

    #[test]
    fn test_polling_take_never_blocks() {
        let mut s = scheduler_with(&[1]);
        let sem = s.create_semaphore().unwrap();
        assert_eq!(s.take(sem, 0), Ok(TakeStatus::Acquired));
        assert_eq!(s.take(sem, 0), Err(KernelError::WouldBlock));
        assert_eq!(s.current_tcb().state, TaskState::Running);
    }

    #[test]
    fn test_give_hands_off_to_waiter() {
        let mut s = scheduler_with(&[2, 2]);
        let sem = s.create_semaphore().unwrap();

        let holder = s.current_task;
        assert_eq!(s.take(sem, 100), Ok(TakeStatus::Acquired));

        s.yield_current();
        let waiter = s.schedule();
        assert_ne!(waiter, holder);
        assert_eq!(s.take(sem, 100), Ok(TakeStatus::Blocked));
        assert_eq!(s.schedule(), holder);

        // Peer releases well inside the block time
        run_ticks(&mut s, 5);
        assert_eq!(s.give(sem), Ok(()));
        assert_eq!(s.tasks[waiter].state, TaskState::Ready);
        assert_eq!(s.semaphores.is_held(sem), Ok(true));

        s.yield_current();
        assert_eq!(s.schedule(), waiter);
        assert_eq!(s.finish_take(), Ok(()));
    }

    #[test]
    fn test_take_times_out_when_holder_overruns() {
        let mut s = scheduler_with(&[2, 2]);
        let sem = s.create_semaphore().unwrap();
        let holder = s.current_task;
        s.take(sem, 0).unwrap();

        s.yield_current();
        let waiter = s.schedule();
        assert_eq!(s.take(sem, 100), Ok(TakeStatus::Blocked));
        s.schedule();
        assert_eq!(s.current_task, holder);

        // Holder keeps the semaphore past the waiter's block time
        for _ in 0..100 {
            s.tick();
        }
        assert_eq!(s.tasks[waiter].state, TaskState::Ready);

        s.current_task = holder;
        s.yield_current();
        assert_eq!(s.schedule(), waiter);
        assert_eq!(s.finish_take(), Err(KernelError::Timeout));
        assert_eq!(s.semaphores.is_held(sem), Ok(true));
    }

    #[test]
    fn test_give_prefers_highest_priority_waiter() {
        let mut s = scheduler_with(&[1, 3, 4]);
        let sem = s.create_semaphore().unwrap();

        // Task 3 (prio 4) takes, then blocks on a delay
        assert_eq!(s.current_task, 3);
        s.take(sem, 0).unwrap();
        s.delay_current(50);
        // Task 2 (prio 3) then task 1 (prio 1) block on the semaphore
        assert_eq!(s.schedule(), 2);
        s.take(sem, WAIT_FOREVER).unwrap();
        assert_eq!(s.schedule(), 1);
        s.take(sem, WAIT_FOREVER).unwrap();
        assert_eq!(s.tasks[2].wake_tick, None);

        assert_eq!(s.give(sem), Ok(()));
        assert_eq!(s.tasks[2].state, TaskState::Ready);
        assert_eq!(s.tasks[2].wait_result, WaitResult::Granted);
        assert_eq!(s.tasks[1].state, TaskState::Blocked);
        assert!(s.needs_reschedule);
    }

    #[test]
    fn test_double_give_rejected() {
        let mut s = scheduler_with(&[1]);
        let sem = s.create_semaphore().unwrap();
        s.take(sem, 0).unwrap();
        assert_eq!(s.give(sem), Ok(()));
        assert_eq!(s.give(sem), Err(KernelError::NotHeld));
    }

    #[test]
    fn test_suspend_and_resume() {
        let mut s = scheduler_with(&[2, 1]);
        assert_eq!(s.current_task, 1);

        s.suspend(1).unwrap();
        assert!(s.needs_reschedule);
        assert_eq!(s.schedule(), 2);
        run_ticks(&mut s, 3 * DEFAULT_TIME_SLICE);
        assert_ne!(s.current_task, 1);

        s.resume(1).unwrap();
        assert!(s.needs_reschedule);
        assert_eq!(s.schedule(), 1);
        assert_eq!(s.suspend(7), Err(KernelError::InvalidTask));
    }

    #[test]
    fn test_suspend_cancels_semaphore_wait() {
        let mut s = scheduler_with(&[1, 1]);
        let sem = s.create_semaphore().unwrap();
        s.take(sem, 0).unwrap();
        s.yield_current();
        let waiter = s.schedule();
        s.take(sem, WAIT_FOREVER).unwrap();
        s.schedule();

        s.suspend(waiter).unwrap();
        assert_eq!(s.tasks[waiter].waiting_on, None);
        assert_eq!(s.tasks[waiter].wait_result, WaitResult::TimedOut);

        // Nobody waits any more, so give makes the semaphore available
        assert_eq!(s.give(sem), Ok(()));
        assert_eq!(s.semaphores.is_held(sem), Ok(false));
    }

    #[test]
    fn test_initial_stack_frame() {
        let mut s = Scheduler::new();
        let id = s.create_task(dummy_task, 0x2A, TaskConfig::new("T", 1)).unwrap();
        let tcb = &s.tasks[id];
        let frame = tcb.stack_pointer;
        let top = tcb.stack.top() & !0x07;
        assert_eq!(frame as usize, top - 64);
        unsafe {
            assert_eq!(*frame.add(8), 0x2A);
            assert_eq!(*frame.add(14) & 1, 0);
            assert_eq!(*frame.add(15), 0x0100_0000);
        }
    }
}
