//! # Guarded Task
//!
//! Body shared by every self-test task. One cycle:
//!
//! 1. take the group semaphore, waiting at most the group's block time
//! 2. check the cell still holds the expected value left by the last holder
//! 3. count the cell from zero back up to the expected value, re-reading it
//!    after every write
//! 4. give the semaphore back
//! 5. bump this task's check counter if nothing went wrong
//! 6. sleep `block_time × DELAY_FACTOR` ticks so lower priorities can run
//!
//! Any interleaved write from the other task of the group during step 3
//! shows up as a mismatch. Faults are reported once per cycle and never
//! stop the task.

use crate::config::DELAY_FACTOR;
use crate::diag::DiagnosticSink;

use super::group::TaskGroupConfig;
use super::liveness::{CheckIndex, CheckVariables};
use super::Runtime;

pub const MSG_TASK_STARTED: &str = "Guarded shared variable task started.";
pub const MSG_UNEXPECTED_STATE: &str = "Guarded shared variable in unexpected state.";

/// How a single cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The semaphore could not be taken within the block time.
    NotAcquired,
    /// A full critical section ran without faults.
    Clean,
    /// The critical section ran but a check failed.
    Faulted,
}

pub struct GuardedTask<'a, R: Runtime> {
    runtime: &'a R,
    config: TaskGroupConfig<'a>,
    checks: &'a CheckVariables,
    sink: &'a DiagnosticSink,
    check: CheckIndex,
    faulted: bool,
}

impl<'a, R: Runtime> GuardedTask<'a, R> {
    /// Claim a check index and announce the task.
    pub fn start(
        runtime: &'a R,
        config: TaskGroupConfig<'a>,
        checks: &'a CheckVariables,
        sink: &'a DiagnosticSink,
    ) -> Self {
        let check = checks.allocate(config.kind);
        sink.post(MSG_TASK_STARTED);
        Self {
            runtime,
            config,
            checks,
            sink,
            check,
            faulted: false,
        }
    }

    pub fn check_index(&self) -> CheckIndex {
        self.check
    }

    /// Run cycles forever.
    pub fn run(mut self) -> ! {
        loop {
            self.run_cycle();
        }
    }

    pub fn run_cycle(&mut self) -> CycleOutcome {
        let TaskGroupConfig {
            semaphore,
            cell,
            block_time,
            expected_value,
            ..
        } = self.config;

        if self.runtime.take(semaphore, block_time).is_err() {
            // Polling never blocks, so hand the rest of the slice over
            if block_time == 0 {
                self.runtime.yield_now();
            }
            return CycleOutcome::NotAcquired;
        }

        self.faulted = false;

        if cell.load() != expected_value {
            self.fault();
        }

        for value in 0..=expected_value {
            cell.store(value);
            if cell.load() != value {
                self.fault();
            }
        }

        if self.runtime.give(semaphore).is_err() {
            self.fault();
        }

        let outcome = if self.faulted {
            CycleOutcome::Faulted
        } else {
            self.checks.record_progress(self.check);
            CycleOutcome::Clean
        };

        if block_time > 0 {
            self.runtime.delay(block_time.saturating_mul(DELAY_FACTOR));
        }

        outcome
    }

    fn fault(&mut self) {
        if !self.faulted {
            self.sink.post(MSG_UNEXPECTED_STATE);
            self.faulted = true;
        }
    }
}
