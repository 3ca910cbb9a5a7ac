//! # Liveness Tracking
//!
//! Every self-test task owns one check counter, bumped after each
//! fault-free cycle. A supervisor polls the counters periodically; a counter
//! that has not moved since the previous poll means its task is stalled.
//!
//! Check indices are handed out by an allocator guarded by a true critical
//! section, never by a self-test semaphore: tasks claim their index as the
//! very first thing they do, before any group state is touched.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::MAX_CHECKED_TASKS;
use crate::sync::{self, Mutex};

use super::GroupKind;

/// Index of a task's check counter. Indices past the table are valid but
/// untracked: such a task runs normally and never records progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CheckIndex(usize);

impl CheckIndex {
    #[inline]
    pub fn get(self) -> usize {
        self.0
    }

    #[inline]
    pub fn is_tracked(self) -> bool {
        self.0 < MAX_CHECKED_TASKS
    }
}

struct IndexAllocator {
    next: usize,
    owners: [Option<GroupKind>; MAX_CHECKED_TASKS],
}

/// Per-task progress counters plus the index allocator.
pub struct CheckVariables {
    counters: [AtomicU32; MAX_CHECKED_TASKS],
    allocator: Mutex<RefCell<IndexAllocator>>,
}

impl CheckVariables {
    pub const fn new() -> Self {
        Self {
            counters: [const { AtomicU32::new(0) }; MAX_CHECKED_TASKS],
            allocator: Mutex::new(RefCell::new(IndexAllocator {
                next: 0,
                owners: [None; MAX_CHECKED_TASKS],
            })),
        }
    }

    /// Hand out the next unused index, remembering which group owns it.
    pub fn allocate(&self, group: GroupKind) -> CheckIndex {
        sync::critical_section(|cs| {
            let mut alloc = self.allocator.borrow_ref_mut(cs);
            let index = alloc.next;
            alloc.next += 1;
            if let Some(owner) = alloc.owners.get_mut(index) {
                *owner = Some(group);
            }
            CheckIndex(index)
        })
    }

    /// Number of tracked indices handed out so far.
    pub fn allocated(&self) -> usize {
        sync::critical_section(|cs| self.allocator.borrow_ref(cs).next.min(MAX_CHECKED_TASKS))
    }

    /// Group that owns `index`, if it has been handed out and is tracked.
    pub fn owner(&self, index: usize) -> Option<GroupKind> {
        sync::critical_section(|cs| self.allocator.borrow_ref(cs).owners.get(index).copied().flatten())
    }

    /// Count one fault-free cycle for `index`. Only the owning task calls
    /// this, so the counter has a single writer.
    #[inline]
    pub fn record_progress(&self, index: CheckIndex) {
        if let Some(counter) = self.counters.get(index.0) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current counter value for `index`; zero for untracked indices.
    #[inline]
    pub fn value(&self, index: CheckIndex) -> u32 {
        self.counters
            .get(index.0)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }
}

// One stall bit per tracked task.
const _: () = assert!(MAX_CHECKED_TASKS <= u32::BITS as usize);

/// Result of one liveness poll.
#[derive(Debug, Clone, Copy)]
pub struct ProgressReport {
    stalled: u32,
    tracked: usize,
    owners: [Option<GroupKind>; MAX_CHECKED_TASKS],
    advisory: bool,
}

impl ProgressReport {
    /// True when at least one task is tracked and every tracked counter
    /// moved since the previous poll.
    pub fn is_progressing(&self) -> bool {
        self.tracked > 0 && self.stalled == 0
    }

    /// Whether the task holding `index` made no progress.
    pub fn is_stalled(&self, index: CheckIndex) -> bool {
        index.is_tracked() && index.0 < self.tracked && self.stalled & (1 << index.0) != 0
    }

    /// Progress of one group, or `None` if none of its tasks is tracked.
    pub fn group_progressing(&self, group: GroupKind) -> Option<bool> {
        let mut seen = false;
        for (i, owner) in self.owners.iter().enumerate().take(self.tracked) {
            if *owner == Some(group) {
                seen = true;
                if self.stalled & (1 << i) != 0 {
                    return Some(false);
                }
            }
        }
        seen.then_some(true)
    }

    /// Set on the first poll: the snapshot it compared against was the
    /// all-zero initial state, not a previous observation.
    pub fn is_advisory(&self) -> bool {
        self.advisory
    }

    /// Number of tasks covered by this report.
    pub fn tracked(&self) -> usize {
        self.tracked
    }
}

/// Snapshot-based stall detector.
pub struct LivenessTracker {
    last: [u32; MAX_CHECKED_TASKS],
    polls: u32,
}

impl LivenessTracker {
    pub const fn new() -> Self {
        Self {
            last: [0; MAX_CHECKED_TASKS],
            polls: 0,
        }
    }

    /// Compare every tracked counter with the previous snapshot, then
    /// overwrite the snapshot regardless of the outcome.
    pub fn poll(&mut self, checks: &CheckVariables) -> ProgressReport {
        let tracked = checks.allocated();
        let mut stalled = 0u32;
        let mut owners = [None; MAX_CHECKED_TASKS];

        for (i, last) in self.last.iter_mut().enumerate().take(tracked) {
            let now = checks.value(CheckIndex(i));
            if now == *last {
                stalled |= 1 << i;
            }
            *last = now;
            owners[i] = checks.owner(i);
        }

        let advisory = self.polls == 0;
        self.polls = self.polls.saturating_add(1);

        ProgressReport {
            stalled,
            tracked,
            owners,
            advisory,
        }
    }
}
