//! # Cortex-M4 Port Layer
//!
//! Everything in SemGuard that touches the processor directly: the SysTick
//! tick source, PendSV-based context switching, exception priorities, and
//! the jump into the first task.
//!
//! ## Context Switch Mechanism
//!
//! Tasks run in Thread mode on the process stack (PSP); the kernel and
//! handlers use the main stack (MSP). Exception entry stacks R0–R3, R12,
//! LR, PC and xPSR on the PSP in hardware; PendSV pushes R4–R11 on top of
//! that, so a suspended task's whole context sits on its own stack and the
//! TCB only needs to remember the PSP.
//!
//! ## Interrupt Priorities
//!
//! SysTick and PendSV both run at the lowest priority (0xFF). They cannot
//! preempt each other, and a switch requested from SysTick or from a task
//! is performed only once no other handler is active.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::syst::SystClkSource;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::scheduler::Scheduler;

/// Interrupt Control and State Register.
const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
const ICSR_PENDSVSET: u32 = 1 << 28;

/// System Handler Priority Register 3: PendSV in [23:16], SysTick in [31:24].
const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;

/// EXC_RETURN: return to Thread mode, use PSP, no FPU frame.
const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

#[inline]
unsafe fn scheduler() -> &'static mut Scheduler {
    &mut *crate::kernel::SCHEDULER_PTR
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Program SysTick to interrupt at `TICK_HZ` from the core clock.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    syst.set_reload(SYSTEM_CLOCK_HZ / TICK_HZ - 1);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Request a context switch. PendSV runs as soon as no other exception is
/// active and interrupts are enabled.
#[inline]
pub fn trigger_pendsv() {
    unsafe {
        core::ptr::write_volatile(ICSR, ICSR_PENDSVSET);
    }
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Drop PendSV and SysTick to the lowest exception priority.
pub fn set_interrupt_priorities() {
    unsafe {
        let val = core::ptr::read_volatile(SHPR3);
        core::ptr::write_volatile(SHPR3, val | (0xFF << 16) | (0xFF << 24));
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Switch Thread mode to the PSP and enter the first task.
///
/// `psp` is the stack pointer prepared by the scheduler: eight software
/// registers followed by the hardware frame. The hardware frame is popped
/// by hand so the task argument ends up in R0.
///
/// # Safety
/// Must only be called once, from `kernel::start()`, with a stack pointer
/// produced by `Scheduler::create_task`.
pub unsafe fn start_first_task(psp: *const u32) -> ! {
    asm!(
        "adds r0, #32",        // Skip R4-R11 (8×4 bytes)
        "msr psp, r0",
        "movs r0, #2",         // CONTROL.SPSEL = 1: Thread mode uses PSP
        "msr control, r0",
        "isb",
        "pop {{r0-r3, r12}}",  // R0 = task argument
        "pop {{r4}}",          // LR (task_exit, unused: tasks never return)
        "pop {{r5}}",          // PC (entry, bit 0 clear)
        "pop {{r6}}",          // xPSR (discarded)
        "orr r5, r5, #1",      // Thumb state for bx
        "cpsie i",
        "bx r5",
        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler: performs the context switch.
///
/// ## Sequence
/// 1. Push R4–R11 onto the outgoing task's stack (PSP)
/// 2. Record the resulting PSP in the outgoing TCB
/// 3. Let the scheduler pick the next task; get its PSP back in R0
/// 4. Pop R4–R11 from the incoming task's stack and load its PSP
/// 5. Exception return; hardware restores the rest of the frame
///
/// # Safety
/// Installed in the vector table by name; must follow the Cortex-M4
/// exception entry and exit convention exactly.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {save_context}",
        "bl {do_schedule}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "ldr r0, ={exc_return}",
        "bx r0",
        save_context = sym save_current_context,
        do_schedule = sym do_context_switch,
        exc_return = const EXC_RETURN_THREAD_PSP,
    );
}

/// Store the outgoing task's PSP. Called from PendSV.
///
/// # Safety
/// Called from assembly context with interrupts disabled.
#[no_mangle]
unsafe extern "C" fn save_current_context(psp: *mut u32) {
    let scheduler = scheduler();
    let current = scheduler.current_task;
    if current < scheduler.task_count {
        scheduler.tasks[current].stack_pointer = psp;
    }
}

/// Pick the next task and return its saved PSP. Called from PendSV.
///
/// # Safety
/// Called from assembly context.
#[no_mangle]
unsafe extern "C" fn do_context_switch() -> *mut u32 {
    let scheduler = scheduler();
    let next = scheduler.schedule();
    scheduler.tasks[next].stack_pointer
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler: advances kernel time and requests a switch
/// when a sleeper woke up or the running slice ran out.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    let scheduler = scheduler();
    scheduler.tick();

    if scheduler.needs_reschedule {
        trigger_pendsv();
    }
}
