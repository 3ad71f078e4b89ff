//! Core clock estimation from the cycle counter.
//!
//! Auxiliary to the decode engine: samples the monotonic cycle counter over
//! a short wall-clock window and divides. The calling thread's scheduling
//! priority is raised for the window so the sample is not cut short by
//! preemption, and restored on every exit path via a drop guard.

use std::time::{Duration, Instant};

use crate::probe::RawProbe;

/// Scoped niceness elevation. Restores the prior value on drop.
#[cfg(unix)]
struct PriorityGuard {
    prior: Option<i32>,
}

#[cfg(unix)]
impl PriorityGuard {
    /// Raise the calling process's priority for the sampling window.
    ///
    /// Failure to raise (no privilege) is not an error; the guard then
    /// restores nothing.
    fn elevate() -> Self {
        // getpriority returning -1 is a legitimate niceness, not an error,
        // for a PRIO_PROCESS/self query.
        let prior = unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) };
        if unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, -20) } != 0 {
            log::debug!(
                "setpriority failed (unprivileged?): {}",
                std::io::Error::last_os_error()
            );
            return Self { prior: None };
        }
        Self { prior: Some(prior) }
    }
}

#[cfg(unix)]
impl Drop for PriorityGuard {
    fn drop(&mut self) {
        if let Some(prior) = self.prior {
            if unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, prior) } != 0 {
                log::warn!(
                    "failed to restore scheduling priority: {}",
                    std::io::Error::last_os_error()
                );
            }
        }
    }
}

#[cfg(not(unix))]
struct PriorityGuard;

#[cfg(not(unix))]
impl PriorityGuard {
    fn elevate() -> Self {
        Self
    }
}

/// Estimate the core clock in MHz by sampling `probe.cycle_counter()` over
/// `window` of wall-clock time.
///
/// Returns `None` when the counter does not advance (virtualized or
/// unsupported counters). The window should be tens of milliseconds;
/// shorter windows amplify counter-read jitter.
pub fn estimate_frequency_mhz(probe: &dyn RawProbe, window: Duration) -> Option<u32> {
    let _guard = PriorityGuard::elevate();

    let wall_start = Instant::now();
    let cycles_start = probe.cycle_counter();

    while wall_start.elapsed() < window {
        std::hint::spin_loop();
    }

    let cycles = probe.cycle_counter().checked_sub(cycles_start)?;
    let elapsed = wall_start.elapsed();
    if cycles == 0 || elapsed.is_zero() {
        return None;
    }

    let mhz = cycles as f64 / elapsed.as_secs_f64() / 1_000_000.0;
    if mhz < 1.0 {
        return None;
    }
    Some(mhz.round() as u32)
}
