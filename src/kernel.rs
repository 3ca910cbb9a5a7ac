//! # Kernel
//!
//! Top-level kernel initialization and public API for SemGuard.
//!
//! The kernel owns the global scheduler instance, provides task, delay and
//! semaphore APIs, and coordinates system startup. All public functions
//! use critical sections to ensure interrupt safety.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()        ← Reset scheduler, create idle task
//!         ├─► kernel::create_task() ← Register tasks (×N)
//!         └─► kernel::start()       ← Launch scheduler (no return)
//!               ├─► Configure SysTick
//!               ├─► Set interrupt priorities
//!               └─► Start first task via arch::start_first_task()
//! ```
//!
//! ## Blocking
//!
//! A blocking call marks the running task Blocked inside a critical section
//! and pends PendSV. The switch happens as soon as the critical section
//! ends; when the task is scheduled again it picks up right after that
//! point and reads the outcome of its wait.

use core::ptr::addr_of_mut;

use crate::arch::cortex_m4;
use crate::config::IDLE_PRIORITY;
use crate::error::KernelError;
use crate::scheduler::{Scheduler, TakeStatus};
use crate::semaphore::SemaphoreHandle;
use crate::semtest::Runtime;
use crate::sync;
use crate::task::{TaskConfig, TaskEntry, TaskId};

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// Global scheduler instance.
///
/// # Safety
/// Accessed via `SCHEDULER_PTR` which is set during `init()`.
/// All access is through critical sections or from ISR context
/// (where interrupts are already serialized by priority).
static mut SCHEDULER: Scheduler = Scheduler::new();

/// Raw pointer to the global scheduler. Used by the arch layer
/// (PendSV, SysTick handlers) which cannot easily use references.
///
/// # Safety
/// Set once during `init()`, read from ISR context.
#[no_mangle]
pub static mut SCHEDULER_PTR: *mut Scheduler = core::ptr::null_mut();

/// Run `f` on the scheduler inside a critical section.
fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    sync::critical_section(|_cs| unsafe { f(&mut *SCHEDULER_PTR) })
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Idle task: runs at `IDLE_PRIORITY` whenever nothing else is ready.
///
/// It yields every round so idle-priority tasks get the CPU promptly,
/// then sleeps until the next interrupt.
extern "C" fn idle_task(_arg: usize) -> ! {
    loop {
        yield_task();
        cortex_m::asm::wfi();
    }
}

/// Initialize the SemGuard kernel.
///
/// Must be called before any other kernel function. Sets up the global
/// scheduler, its pointer for ISR access, and the idle task.
///
/// # Safety
/// Must be called exactly once, from the main thread, before starting
/// the scheduler.
pub fn init() -> Result<(), KernelError> {
    unsafe {
        let scheduler = addr_of_mut!(SCHEDULER);
        scheduler.write(Scheduler::new());
        SCHEDULER_PTR = scheduler;
    }
    create_task(idle_task, 0, TaskConfig::new("IDLE", IDLE_PRIORITY))?;
    Ok(())
}

/// Create a new task and register it with the scheduler.
///
/// # Parameters
/// - `entry`: Task entry function. Must be `extern "C" fn(usize) -> !` (never returns).
/// - `arg`: Value passed to `entry` in R0.
/// - `config`: Static task configuration (name, priority, time slice).
///
/// # Returns
/// - `Ok(task_id)`: The task's index in the scheduler array.
/// - `Err(KernelError::TaskTableFull)`: `MAX_TASKS` reached.
pub fn create_task(entry: TaskEntry, arg: usize, config: TaskConfig) -> Result<TaskId, KernelError> {
    let id = with_scheduler(|s| s.create_task(entry, arg, config))?;
    debug!("kernel: created task {} '{}' prio {}", id, config.name, config.priority);
    Ok(id)
}

/// Start the SemGuard scheduler. **Does not return.**
///
/// Configures the SysTick timer, sets interrupt priorities, and launches
/// the highest-priority task. After this call, the system is fully
/// preemptive.
///
/// # Safety
/// - `init()` must have been called.
/// - Must be called from the main thread (not from an ISR).
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    // Configure SysTick timer
    cortex_m4::configure_systick(&mut core_peripherals.SYST);

    // Set PendSV and SysTick to lowest priority
    cortex_m4::set_interrupt_priorities();

    // Get the first task's stack pointer and launch
    let first_sp = with_scheduler(|scheduler| {
        let first = scheduler.schedule();
        info!("kernel: starting with task '{}'", scheduler.tasks[first].config.name);
        scheduler.tasks[first].stack_pointer as *const u32
    });

    unsafe {
        cortex_m4::start_first_task(first_sp);
    }
}

/// Voluntarily yield the CPU from the current task.
///
/// Resets the task's time slice and lets the next ready task of equal
/// priority run. Returns immediately if there is none.
pub fn yield_task() {
    with_scheduler(|s| {
        s.yield_current();
        cortex_m4::trigger_pendsv();
    });
}

/// Block the calling task for `ticks` scheduler ticks. Zero yields.
///
/// PendSV is pended before the critical section ends, so the switch it
/// requests is the one taken when interrupts come back on.
pub fn delay(ticks: u32) {
    with_scheduler(|s| {
        s.delay_current(ticks);
        cortex_m4::trigger_pendsv();
    });
}

/// Ticks elapsed since the scheduler started.
pub fn tick_count() -> u64 {
    with_scheduler(|s| s.tick_count)
}

/// Create a binary semaphore in the available state.
pub fn create_binary_semaphore() -> Result<SemaphoreHandle, KernelError> {
    with_scheduler(|s| s.create_semaphore())
}

/// Take a semaphore, waiting at most `timeout` ticks.
///
/// - `timeout == 0` polls and fails with `WouldBlock`.
/// - `timeout == WAIT_FOREVER` waits until the semaphore is given.
/// - Otherwise fails with `Timeout` once the block time has elapsed.
pub fn semaphore_take(handle: SemaphoreHandle, timeout: u32) -> Result<(), KernelError> {
    let status = with_scheduler(|s| {
        let status = s.take(handle, timeout)?;
        if status == TakeStatus::Blocked {
            cortex_m4::trigger_pendsv();
        }
        Ok::<_, KernelError>(status)
    })?;

    match status {
        TakeStatus::Acquired => Ok(()),
        // Back from PendSV: the wait is over one way or the other
        TakeStatus::Blocked => with_scheduler(|s| s.finish_take()),
    }
}

/// Give a semaphore back, waking the best waiter if there is one.
pub fn semaphore_give(handle: SemaphoreHandle) -> Result<(), KernelError> {
    let preempt = with_scheduler(|s| {
        s.give(handle)?;
        Ok::<_, KernelError>(s.needs_reschedule)
    })?;
    if preempt {
        cortex_m4::trigger_pendsv();
    }
    Ok(())
}

/// Hold a task out of scheduling until `resume_task`.
pub fn suspend_task(id: TaskId) -> Result<(), KernelError> {
    let preempt = with_scheduler(|s| {
        s.suspend(id)?;
        Ok::<_, KernelError>(s.needs_reschedule)
    })?;
    if preempt {
        cortex_m4::trigger_pendsv();
    }
    Ok(())
}

/// Make a suspended task schedulable again.
pub fn resume_task(id: TaskId) -> Result<(), KernelError> {
    let preempt = with_scheduler(|s| {
        s.resume(id)?;
        Ok::<_, KernelError>(s.needs_reschedule)
    })?;
    if preempt {
        cortex_m4::trigger_pendsv();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Self-test runtime
// ---------------------------------------------------------------------------

/// The kernel as seen by the mutual-exclusion self-test.
pub struct Kernel;

impl Runtime for Kernel {
    fn create_binary_semaphore(&self) -> Result<SemaphoreHandle, KernelError> {
        create_binary_semaphore()
    }

    fn spawn(&self, entry: TaskEntry, arg: usize, config: TaskConfig) -> Result<TaskId, KernelError> {
        create_task(entry, arg, config)
    }

    fn take(&self, sem: SemaphoreHandle, block_time: u32) -> Result<(), KernelError> {
        semaphore_take(sem, block_time)
    }

    fn give(&self, sem: SemaphoreHandle) -> Result<(), KernelError> {
        semaphore_give(sem)
    }

    fn yield_now(&self) {
        yield_task();
    }

    fn delay(&self, ticks: u32) {
        delay(ticks);
    }
}
