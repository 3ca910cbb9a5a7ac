//! # SemGuard
//!
//! A small preemptive Real-Time Operating System (RTOS) kernel for ARM
//! Cortex-M4 microcontrollers, shipped with a mutual-exclusion self-test
//! that continuously proves its binary semaphores actually exclude.
//!
//! ## Overview
//!
//! The kernel schedules fixed-priority tasks preemptively, rotates tasks of
//! equal priority round-robin, and offers tick delays and binary semaphores
//! with blocking-with-timeout acquisition. On top of it, the self-test runs
//! two groups of two tasks:
//!
//! - **Polling group** (idle priority): tries the semaphore without
//!   blocking and yields when it is taken
//! - **Blocking group** (caller's priority): waits up to 100 ms for the
//!   semaphore and sleeps between cycles so lower priorities can run
//!
//! Inside the critical section each task counts a shared cell from zero to
//! its group's expected value, checking after every write that nobody else
//! touched it. A supervisor polls per-task progress counters to catch
//! stalls.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │          Firmware (main.rs): supervisor task            │
//! ├────────────────────────────────────────────────────────┤
//! │            Mutual-Exclusion Self-Test (semtest/)        │
//! │   GuardedTask · TaskGroups · Liveness · SharedCell      │
//! ├──────────────────────────┬─────────────────────────────┤
//! │  Diagnostics (diag.rs)   │      Runtime trait           │
//! ├──────────────────────────┴─────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   init() · create_task() · start() · delay() · take()   │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │   Semaphores       │  Sync Primitives  │
//! │  scheduler.rs│   semaphore.rs     │  sync.rs          │
//! │  ─ tick()    │   ─ create_binary()│  ─ critical_section│
//! │  ─ schedule()│   ─ try_take()     │                   │
//! │  ─ give()    │   ─ release()      │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │              Task Model (task.rs)                       │
//! │          TCB · TaskConfig · TaskState · WaitResult      │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │    PendSV · SysTick · Context Switch · First Task       │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: All state is statically allocated
//! - **No `alloc`**: Pure `core` only
//! - **Fixed-size tables**: `MAX_TASKS` TCBs, `MAX_SEMAPHORES` semaphores
//! - **Per-task stack**: `[u8; STACK_SIZE]` inline in TCB
//! - **Critical sections**: `critical_section::with()` for shared state
//!
//! ## Host Builds
//!
//! The arch port and kernel glue only exist for `target_os = "none"`. The
//! scheduler, semaphores, diagnostics and the self-test logic are plain
//! Rust and their unit tests run on the host.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;

pub mod config;
pub mod diag;
pub mod error;
pub mod scheduler;
pub mod semaphore;
pub mod semtest;
pub mod sync;
pub mod task;

#[cfg(target_os = "none")]
pub mod arch;
#[cfg(target_os = "none")]
pub mod kernel;
