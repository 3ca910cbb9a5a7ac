//! # Task Control Block
//!
//! Defines the task model for SemGuard. A task is a never-returning entry
//! function with a fixed priority, an inline stack, and the bookkeeping the
//! scheduler needs to block it on a delay or a semaphore.

use crate::config::{DEFAULT_TIME_SLICE, STACK_SIZE};
use crate::semaphore::SemaphoreHandle;

/// Scheduling priority. Higher values are more important; 0 is idle.
pub type Priority = u8;

/// Index of a task in the scheduler's task array.
pub type TaskId = usize;

/// Task entry point. The argument given at creation arrives in R0.
pub type TaskEntry = extern "C" fn(usize) -> !;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task in the scheduler's state machine.
///
/// ```text
///   ┌──────────┐     schedule()      ┌─────────┐
///   │  Ready   │ ──────────────────► │ Running │
///   └──────────┘                     └─────────┘
///        ▲                                │
///        │         preempt / yield        │
///        └────────────────────────────────┤
///        │                                │ delay() / take()
///        │   tick expiry / give()         ▼
///        │                          ┌──────────┐
///        └───────────────────────── │ Blocked  │
///                                   └──────────┘
/// ```
///
/// Any state may move to `Suspended` through `suspend()`; `resume()` returns
/// the task to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum TaskState {
    /// Task is ready to run and waiting in the run queue.
    Ready,
    /// Task is currently executing on the CPU.
    Running,
    /// Task is waiting for a delay to expire or a semaphore to be given.
    Blocked,
    /// Task is held out of scheduling until resumed.
    Suspended,
}

/// Result of the last semaphore wait, read by the task once it runs again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// No wait has completed since the task last checked.
    Pending,
    /// Ownership of the semaphore was handed to this task by `give()`.
    Granted,
    /// The block time ran out (or the task was suspended) first.
    TimedOut,
}

// ---------------------------------------------------------------------------
// Task configuration (immutable after creation)
// ---------------------------------------------------------------------------

/// Static configuration for a task, set at creation time.
#[derive(Debug, Clone, Copy)]
pub struct TaskConfig {
    /// Human-readable name, shown in logs.
    pub name: &'static str,

    /// Base priority (higher = more important). Range: 0–255.
    pub priority: Priority,

    /// Time slice in ticks for this task. If 0, uses `DEFAULT_TIME_SLICE`.
    pub time_slice: u32,
}

impl TaskConfig {
    /// Configuration with the default time slice.
    pub const fn new(name: &'static str, priority: Priority) -> Self {
        Self {
            name,
            priority,
            time_slice: 0,
        }
    }

    /// Returns the effective time slice, falling back to the system default.
    #[inline]
    pub const fn effective_time_slice(&self) -> u32 {
        if self.time_slice > 0 {
            self.time_slice
        } else {
            DEFAULT_TIME_SLICE
        }
    }
}

// ---------------------------------------------------------------------------
// Task stack
// ---------------------------------------------------------------------------

/// Per-task stack memory, aligned to 8 bytes as required by ARM AAPCS.
#[repr(C, align(8))]
pub struct TaskStack(pub [u8; STACK_SIZE]);

impl TaskStack {
    pub const fn new() -> Self {
        Self([0u8; STACK_SIZE])
    }

    /// Address one past the highest byte of the stack.
    #[inline]
    pub fn top(&self) -> usize {
        self.0.as_ptr() as usize + STACK_SIZE
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB): the central data structure for each task.
///
/// TCBs are stored in a static array in the scheduler, no heap allocation.
/// Each TCB includes an inline stack; `stack_pointer` points into it and is
/// updated on every context switch.
pub struct TaskControlBlock {
    /// Unique task identifier (index in the scheduler's task array).
    pub id: TaskId,

    /// Current execution state.
    pub state: TaskState,

    /// Static configuration (name, priority, time slice).
    pub config: TaskConfig,

    /// Saved stack pointer (PSP). Updated on context switch.
    pub stack_pointer: *mut u32,

    /// Per-task stack memory.
    pub stack: TaskStack,

    /// Remaining ticks in the current time slice.
    pub ticks_remaining: u32,

    /// Absolute tick at which a Blocked task is woken. `None` waits forever.
    pub wake_tick: Option<u64>,

    /// Semaphore this task is blocked on, if any.
    pub waiting_on: Option<SemaphoreHandle>,

    /// Tick at which the current semaphore wait started. Orders waiters of
    /// equal priority.
    pub blocked_since: u64,

    /// Outcome of the last semaphore wait.
    pub wait_result: WaitResult,

    /// Total ticks this task has been in the Running state.
    pub total_ticks: u32,

    /// Whether this task is allocated (true) or a free slot (false).
    pub active: bool,
}

// Safety: TaskControlBlock contains a raw pointer (stack_pointer) but
// it always points into the task's own stack array. We only access TCBs
// within critical sections.
unsafe impl Send for TaskControlBlock {}
unsafe impl Sync for TaskControlBlock {}

impl TaskControlBlock {
    /// Empty slot, used to initialize the static array.
    pub const EMPTY: Self = Self::empty();

    /// Create an empty (unallocated) TCB.
    pub const fn empty() -> Self {
        Self {
            id: 0,
            state: TaskState::Suspended,
            config: TaskConfig::new("", 0),
            stack_pointer: core::ptr::null_mut(),
            stack: TaskStack::new(),
            ticks_remaining: 0,
            wake_tick: None,
            waiting_on: None,
            blocked_since: 0,
            wait_result: WaitResult::Pending,
            total_ticks: 0,
            active: false,
        }
    }

    /// Initialize a TCB for a new task with the given configuration.
    ///
    /// This sets the task to Ready state and initializes its time slice.
    /// The stack must be separately initialized by the scheduler.
    pub fn init(&mut self, id: TaskId, config: TaskConfig) {
        self.id = id;
        self.state = TaskState::Ready;
        self.config = config;
        self.ticks_remaining = config.effective_time_slice();
        self.wake_tick = None;
        self.waiting_on = None;
        self.blocked_since = 0;
        self.wait_result = WaitResult::Pending;
        self.total_ticks = 0;
        self.active = true;
    }

    /// Block this task until `wake_tick` (or forever when `None`).
    pub fn block(&mut self, wake_tick: Option<u64>, waiting_on: Option<SemaphoreHandle>, now: u64) {
        self.state = TaskState::Blocked;
        self.wake_tick = wake_tick;
        self.waiting_on = waiting_on;
        self.blocked_since = now;
        self.wait_result = WaitResult::Pending;
    }

    /// Return a Blocked task to Ready, recording how its wait ended.
    pub fn unblock(&mut self, result: WaitResult) {
        self.state = TaskState::Ready;
        self.wake_tick = None;
        if self.waiting_on.take().is_some() {
            self.wait_result = result;
        }
    }

    /// Priority used by the scheduler.
    #[inline]
    pub fn priority(&self) -> Priority {
        self.config.priority
    }

    /// Check if this task may be selected to run.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.active && matches!(self.state, TaskState::Ready | TaskState::Running)
    }

    /// Refill the time slice after a yield or expiry.
    #[inline]
    pub fn reload_slice(&mut self) {
        self.ticks_remaining = self.config.effective_time_slice();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcb_initialization() {
        let mut tcb = TaskControlBlock::empty();
        assert!(!tcb.active);
        assert_eq!(tcb.state, TaskState::Suspended);

        let config = TaskConfig {
            name: "worker",
            priority: 5,
            time_slice: 15,
        };
        tcb.init(0, config);

        assert!(tcb.active);
        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.priority(), 5);
        assert_eq!(tcb.config.name, "worker");
        assert_eq!(tcb.ticks_remaining, 15);
        assert!(tcb.is_runnable());
    }

    #[test]
    fn test_block_and_unblock_semaphore_wait() {
        let mut tcb = TaskControlBlock::empty();
        tcb.init(1, TaskConfig::new("waiter", 2));

        let sem = SemaphoreHandle::new(0);
        tcb.block(Some(110), Some(sem), 10);
        assert_eq!(tcb.state, TaskState::Blocked);
        assert!(!tcb.is_runnable());
        assert_eq!(tcb.blocked_since, 10);
        assert_eq!(tcb.wait_result, WaitResult::Pending);

        tcb.unblock(WaitResult::Granted);
        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.wake_tick, None);
        assert_eq!(tcb.waiting_on, None);
        assert_eq!(tcb.wait_result, WaitResult::Granted);
    }

    #[test]
    fn test_delay_unblock_leaves_wait_result_alone() {
        let mut tcb = TaskControlBlock::empty();
        tcb.init(2, TaskConfig::new("sleeper", 1));

        tcb.block(Some(50), None, 0);
        tcb.unblock(WaitResult::TimedOut);
        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.wait_result, WaitResult::Pending);
    }

    #[test]
    fn test_effective_time_slice_default() {
        let config = TaskConfig::new("idle", 0);
        assert_eq!(config.effective_time_slice(), DEFAULT_TIME_SLICE);
    }

    #[test]
    fn test_stack_alignment() {
        let stack = TaskStack::new();
        assert_eq!(stack.0.as_ptr() as usize % 8, 0);
        assert_eq!(stack.top() - stack.0.as_ptr() as usize, STACK_SIZE);
    }
}
