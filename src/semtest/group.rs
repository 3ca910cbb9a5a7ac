//! # Task Groups
//!
//! A task group is two tasks sharing one `SharedCell` and one binary
//! semaphore under a single acquisition policy. Group state lives in a
//! static table so that tasks, which only receive a slot index as their
//! entry argument, can find it.

use core::cell::Cell;

use crate::config::IDLE_PRIORITY;
use crate::semaphore::SemaphoreHandle;
use crate::sync::{self, Mutex};
use crate::task::{Priority, TaskConfig, TaskEntry};

use super::cell::SharedCell;
use super::{GroupKind, Runtime};

/// Number of group slots: one polling group, one blocking group.
pub const GROUP_COUNT: usize = 2;

/// Parameters bound to a group when it is created.
#[derive(Clone, Copy)]
pub struct TaskGroupConfig<'a> {
    pub kind: GroupKind,
    pub semaphore: SemaphoreHandle,
    pub cell: &'a SharedCell,
    /// Ticks to wait for the semaphore; zero polls.
    pub block_time: u32,
    /// Value the cell holds whenever nobody owns the semaphore.
    pub expected_value: u32,
}

impl<'a> TaskGroupConfig<'a> {
    pub fn new(kind: GroupKind, semaphore: SemaphoreHandle, cell: &'a SharedCell) -> Self {
        Self {
            kind,
            semaphore,
            cell,
            block_time: kind.block_time(),
            expected_value: kind.expected_value(),
        }
    }
}

#[derive(Clone, Copy)]
enum SlotState {
    Free,
    Reserved,
    Installed(TaskGroupConfig<'static>),
}

struct GroupSlot {
    cell: SharedCell,
    state: Mutex<Cell<SlotState>>,
}

/// Static storage for group cells and configs.
pub struct GroupTable {
    slots: [GroupSlot; GROUP_COUNT],
}

impl GroupTable {
    pub const fn new() -> Self {
        Self {
            slots: [const {
                GroupSlot {
                    cell: SharedCell::new(0),
                    state: Mutex::new(Cell::new(SlotState::Free)),
                }
            }; GROUP_COUNT],
        }
    }

    /// Claim a free slot for a group that is about to be built.
    pub fn reserve(&self) -> Option<usize> {
        sync::critical_section(|cs| {
            let index = self
                .slots
                .iter()
                .position(|slot| matches!(slot.state.borrow(cs).get(), SlotState::Free))?;
            self.slots[index].state.borrow(cs).set(SlotState::Reserved);
            Some(index)
        })
    }

    /// Give a reserved slot back after a failed build.
    pub fn abandon(&self, index: usize) {
        sync::critical_section(|cs| {
            let state = self.slots[index].state.borrow(cs);
            if matches!(state.get(), SlotState::Reserved) {
                state.set(SlotState::Free);
            }
        });
    }

    /// Initialize the slot's cell to the group's expected value and publish
    /// its config.
    pub fn install(&'static self, index: usize, kind: GroupKind, semaphore: SemaphoreHandle) -> TaskGroupConfig<'static> {
        let slot = &self.slots[index];
        slot.cell.store(kind.expected_value());
        let config = TaskGroupConfig::new(kind, semaphore, &slot.cell);
        sync::critical_section(|cs| slot.state.borrow(cs).set(SlotState::Installed(config)));
        config
    }

    /// Config of an installed group.
    pub fn get(&self, index: usize) -> Option<TaskGroupConfig<'static>> {
        let slot = self.slots.get(index)?;
        sync::critical_section(|cs| match slot.state.borrow(cs).get() {
            SlotState::Installed(config) => Some(config),
            _ => None,
        })
    }
}

/// What `spawn_groups` managed to start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnReport {
    pub polling: bool,
    pub blocking: bool,
    pub tasks_started: usize,
}

/// Build the polling group at idle priority and the blocking group at
/// `blocking_priority`, two tasks each.
///
/// Allocation failures are not fatal: the affected group is skipped and the
/// rest of the system keeps running.
pub fn spawn_groups<R: Runtime>(
    runtime: &R,
    table: &'static GroupTable,
    entry: TaskEntry,
    blocking_priority: Priority,
) -> SpawnReport {
    let mut report = SpawnReport::default();

    for kind in [GroupKind::Polling, GroupKind::Blocking] {
        let priority = match kind {
            GroupKind::Polling => IDLE_PRIORITY,
            GroupKind::Blocking => blocking_priority,
        };
        let Some(started) = spawn_group(runtime, table, kind, entry, priority) else {
            continue;
        };
        match kind {
            GroupKind::Polling => report.polling = true,
            GroupKind::Blocking => report.blocking = true,
        }
        report.tasks_started += started;
    }

    info!(
        "semtest: polling={} blocking={} tasks={}",
        report.polling,
        report.blocking,
        report.tasks_started
    );
    report
}

fn spawn_group<R: Runtime>(
    runtime: &R,
    table: &'static GroupTable,
    kind: GroupKind,
    entry: TaskEntry,
    priority: Priority,
) -> Option<usize> {
    let Some(slot) = table.reserve() else {
        warn!("semtest: no free group slot, {} group not started", kind.label());
        return None;
    };

    let semaphore = match runtime.create_binary_semaphore() {
        Ok(sem) => sem,
        Err(e) => {
            warn!("semtest: {} group not started: {}", kind.label(), e);
            table.abandon(slot);
            return None;
        }
    };

    table.install(slot, kind, semaphore);

    let mut started = 0;
    for name in kind.task_names() {
        match runtime.spawn(entry, slot, TaskConfig::new(name, priority)) {
            Ok(_) => started += 1,
            Err(e) => warn!("semtest: failed to create {}: {}", name, e),
        }
    }
    if started == 0 {
        warn!("semtest: no {} task could be created", kind.label());
        return None;
    }
    Some(started)
}
