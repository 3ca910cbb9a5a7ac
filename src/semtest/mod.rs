//! # Mutual-Exclusion Self-Test
//!
//! Two groups of two tasks hammer a shared cell under a binary semaphore
//! and verify on every cycle that nobody else wrote to it:
//!
//! | Group | Tasks | Block time | Expected value | Priority |
//! |-------|-------|------------|----------------|----------|
//! | Polling | `PolSEM1`, `PolSEM2` | 0 | `0xFF` | idle |
//! | Blocking | `BlkSEM1`, `BlkSEM2` | 100 ms | `0xFFF` | caller's |
//!
//! Each clean cycle bumps the task's check counter; a supervisor calls
//! [`still_making_progress`] periodically to confirm every task is still
//! cycling. Faults are posted to [`DIAGNOSTICS`](crate::diag::DIAGNOSTICS).
//!
//! The harness reaches the kernel only through [`Runtime`], so the same
//! task body runs on the Cortex-M4 kernel and on host threads in tests.

pub mod cell;
pub mod group;
pub mod guard;
pub mod liveness;

#[cfg(test)]
pub(crate) mod testing;

use core::cell::RefCell;

use crate::config::{BLOCKING_EXPECTED_VALUE, BLOCK_TIME_MS, POLLING_EXPECTED_VALUE};
use crate::error::KernelError;
use crate::semaphore::SemaphoreHandle;
use crate::sync::{self, Mutex};
use crate::task::{TaskConfig, TaskEntry, TaskId};

use group::GroupTable;
use liveness::{CheckVariables, LivenessTracker, ProgressReport};

/// Kernel services the self-test consumes.
pub trait Runtime {
    /// Create a binary semaphore in the available state.
    fn create_binary_semaphore(&self) -> Result<SemaphoreHandle, KernelError>;

    /// Create a task running `entry(arg)`.
    fn spawn(&self, entry: TaskEntry, arg: usize, config: TaskConfig) -> Result<TaskId, KernelError>;

    /// Take `sem`, waiting at most `block_time` ticks. Zero polls.
    fn take(&self, sem: SemaphoreHandle, block_time: u32) -> Result<(), KernelError>;

    /// Give `sem` back.
    fn give(&self, sem: SemaphoreHandle) -> Result<(), KernelError>;

    /// Hand the rest of the time slice to an equal-priority task.
    fn yield_now(&self);

    /// Sleep for `ticks` ticks.
    fn delay(&self, ticks: u32);
}

/// Acquisition policy of a task group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum GroupKind {
    /// Zero block time; yields whenever the semaphore is taken.
    Polling,
    /// Waits up to the block time for the semaphore.
    Blocking,
}

impl GroupKind {
    pub const fn expected_value(self) -> u32 {
        match self {
            GroupKind::Polling => POLLING_EXPECTED_VALUE,
            GroupKind::Blocking => BLOCKING_EXPECTED_VALUE,
        }
    }

    pub const fn block_time(self) -> u32 {
        match self {
            GroupKind::Polling => 0,
            GroupKind::Blocking => crate::config::ms_to_ticks(BLOCK_TIME_MS),
        }
    }

    pub const fn task_names(self) -> [&'static str; 2] {
        match self {
            GroupKind::Polling => ["PolSEM1", "PolSEM2"],
            GroupKind::Blocking => ["BlkSEM1", "BlkSEM2"],
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            GroupKind::Polling => "polling",
            GroupKind::Blocking => "blocking",
        }
    }
}

// ---------------------------------------------------------------------------
// System-wide self-test state
// ---------------------------------------------------------------------------

/// Cells and configs of the firmware's two groups.
pub static GROUPS: GroupTable = GroupTable::new();

/// Check counters of every self-test task.
pub static CHECKS: CheckVariables = CheckVariables::new();

static TRACKER: Mutex<RefCell<LivenessTracker>> = Mutex::new(RefCell::new(LivenessTracker::new()));

/// Create both task groups on the kernel. Call once, before the scheduler
/// starts; a second call finds no free group slot and starts nothing.
#[cfg(target_os = "none")]
pub fn start_mutual_exclusion_self_test(priority: crate::task::Priority) -> group::SpawnReport {
    group::spawn_groups(&crate::kernel::Kernel, &GROUPS, guarded_task_entry, priority)
}

#[cfg(target_os = "none")]
extern "C" fn guarded_task_entry(slot: usize) -> ! {
    use crate::diag::DIAGNOSTICS;
    use crate::kernel::{self, Kernel};

    match GROUPS.get(slot) {
        Some(config) => guard::GuardedTask::start(&Kernel, config, &CHECKS, &DIAGNOSTICS).run(),
        None => {
            error!("semtest: task started for empty group slot {}", slot);
            loop {
                kernel::delay(crate::config::WAIT_FOREVER);
            }
        }
    }
}

/// Poll every self-test task's check counter against the previous poll.
///
/// The first report compares against zeroed counters and is marked
/// advisory.
pub fn progress_report() -> ProgressReport {
    sync::critical_section(|cs| TRACKER.borrow_ref_mut(cs).poll(&CHECKS))
}

/// `true` if every self-test task completed a clean cycle since the last
/// call. Intended for a periodic supervisor; discard the first result.
pub fn still_making_progress() -> bool {
    progress_report().is_progressing()
}
