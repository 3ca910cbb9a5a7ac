//! Host implementation of [`Runtime`] for unit tests: semaphores on a
//! `std` mutex and condvar, ticks read as milliseconds.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::error::KernelError;
use crate::semaphore::SemaphoreHandle;
use crate::task::{Priority, TaskConfig, TaskEntry, TaskId};

use super::Runtime;

#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub name: &'static str,
    pub priority: Priority,
    pub arg: usize,
}

pub struct HostRuntime {
    /// `true` means available.
    semaphores: Mutex<Vec<bool>>,
    released: Condvar,
    max_semaphores: usize,
    max_tasks: usize,
    spawned: Mutex<Vec<SpawnRecord>>,
    delays: Mutex<Vec<u32>>,
    yields: AtomicUsize,
    reject_gives: AtomicBool,
}

impl HostRuntime {
    pub fn new() -> Self {
        Self::with_limits(8, 8)
    }

    pub fn with_limits(max_semaphores: usize, max_tasks: usize) -> Self {
        Self {
            semaphores: Mutex::new(Vec::new()),
            released: Condvar::new(),
            max_semaphores,
            max_tasks,
            spawned: Mutex::new(Vec::new()),
            delays: Mutex::new(Vec::new()),
            yields: AtomicUsize::new(0),
            reject_gives: AtomicBool::new(false),
        }
    }

    /// Make every following `give` fail as if the semaphore were not held.
    pub fn reject_gives(&self, reject: bool) {
        self.reject_gives.store(reject, Ordering::SeqCst);
    }

    pub fn is_held(&self, sem: SemaphoreHandle) -> bool {
        !self.semaphores.lock().unwrap()[sem.index()]
    }

    pub fn spawned(&self) -> Vec<SpawnRecord> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn delays(&self) -> Vec<u32> {
        self.delays.lock().unwrap().clone()
    }

    pub fn yields(&self) -> usize {
        self.yields.load(Ordering::SeqCst)
    }
}

impl Runtime for HostRuntime {
    fn create_binary_semaphore(&self) -> Result<SemaphoreHandle, KernelError> {
        let mut sems = self.semaphores.lock().unwrap();
        if sems.len() >= self.max_semaphores {
            return Err(KernelError::SemaphoreTableFull);
        }
        sems.push(true);
        Ok(SemaphoreHandle::new((sems.len() - 1) as u8))
    }

    fn spawn(&self, _entry: TaskEntry, arg: usize, config: TaskConfig) -> Result<TaskId, KernelError> {
        let mut spawned = self.spawned.lock().unwrap();
        if spawned.len() >= self.max_tasks {
            return Err(KernelError::TaskTableFull);
        }
        spawned.push(SpawnRecord {
            name: config.name,
            priority: config.priority,
            arg,
        });
        Ok(spawned.len() - 1)
    }

    fn take(&self, sem: SemaphoreHandle, block_time: u32) -> Result<(), KernelError> {
        let index = sem.index();
        let sems = self.semaphores.lock().unwrap();
        let mut sems = if block_time == 0 {
            sems
        } else {
            let wait = Duration::from_millis(block_time as u64);
            self.released
                .wait_timeout_while(sems, wait, |s| !s[index])
                .unwrap()
                .0
        };
        if !sems[index] {
            return Err(if block_time == 0 {
                KernelError::WouldBlock
            } else {
                KernelError::Timeout
            });
        }
        sems[index] = false;
        Ok(())
    }

    fn give(&self, sem: SemaphoreHandle) -> Result<(), KernelError> {
        if self.reject_gives.load(Ordering::SeqCst) {
            return Err(KernelError::NotHeld);
        }
        let mut sems = self.semaphores.lock().unwrap();
        if sems[sem.index()] {
            return Err(KernelError::NotHeld);
        }
        sems[sem.index()] = true;
        self.released.notify_all();
        Ok(())
    }

    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::SeqCst);
        std::thread::yield_now();
    }

    fn delay(&self, ticks: u32) {
        self.delays.lock().unwrap().push(ticks);
        std::thread::yield_now();
    }
}
