//! # SemGuard Firmware
//!
//! Boots the kernel with the mutual-exclusion self-test and a supervisor:
//!
//! | Task | Priority | Behavior |
//! |------|----------|----------|
//! | `PolSEM1`, `PolSEM2` | 0 (idle) | Poll their semaphore, yield when it is taken |
//! | `BlkSEM1`, `BlkSEM2` | `SELF_TEST_PRIORITY` | Block up to 100 ms on their semaphore, sleep 1 s between cycles |
//! | `CHECK` | `SUPERVISOR_PRIORITY` | Drains diagnostics and checks liveness every period |
//!
//! ## Expected Output (RTT)
//!
//! 1. Four "Guarded shared variable task started." lines shortly after boot.
//! 2. One advisory liveness line after the first period.
//! 3. A "self-test ok" line every period after that. A stall or a fault line
//!    means a self-test task stopped cycling or caught a foreign write.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod firmware {
    use cortex_m_rt::entry;
    use defmt_rtt as _;
    use panic_halt as _;

    use semguard::config::{SELF_TEST_PRIORITY, SUPERVISOR_PERIOD_TICKS, SUPERVISOR_PRIORITY};
    use semguard::diag::DIAGNOSTICS;
    use semguard::kernel;
    use semguard::semtest::{self, GroupKind};
    use semguard::task::TaskConfig;

    /// **Supervisor** (highest priority)
    ///
    /// Sleeps one period, forwards queued diagnostics to the log, then asks
    /// the self-test whether every task completed a clean cycle meanwhile.
    /// Detection only: it never restarts anything.
    extern "C" fn check_task(_arg: usize) -> ! {
        loop {
            kernel::delay(SUPERVISOR_PERIOD_TICKS);

            while let Some(line) = DIAGNOSTICS.pop() {
                defmt::info!("diag: {=str}", line);
            }
            let dropped = DIAGNOSTICS.dropped();
            if dropped > 0 {
                defmt::warn!("diag: {=u32} lines dropped so far", dropped);
            }

            let report = semtest::progress_report();
            if report.is_advisory() {
                defmt::info!(
                    "self-test warming up ({=usize} tasks, progressing={=bool})",
                    report.tracked(),
                    report.is_progressing()
                );
            } else if report.is_progressing() {
                defmt::info!("self-test ok at tick {=u64}", kernel::tick_count());
            } else {
                defmt::error!(
                    "self-test stalled: polling={} blocking={}",
                    report.group_progressing(GroupKind::Polling),
                    report.group_progressing(GroupKind::Blocking)
                );
            }
        }
    }

    /// Firmware entry point. Initializes the kernel, creates tasks, and
    /// starts the scheduler. Does not return.
    #[entry]
    fn main() -> ! {
        // Take ownership of core peripherals
        let cp = cortex_m::Peripherals::take().unwrap();

        kernel::init().expect("kernel init");

        let report = semtest::start_mutual_exclusion_self_test(SELF_TEST_PRIORITY);
        if !(report.polling && report.blocking) {
            defmt::warn!("self-test degraded: {=usize} tasks started", report.tasks_started);
        }

        kernel::create_task(check_task, 0, TaskConfig::new("CHECK", SUPERVISOR_PRIORITY))
            .expect("Failed to create check task");

        // Start the scheduler, does not return
        kernel::start(cp)
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("semguard is firmware: build with --target thumbv7em-none-eabihf");
}
