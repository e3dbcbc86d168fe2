//! Core pinning, memory locking and real-time scheduling.
//!
//! Everything here is best effort: a benchmark still runs, just with more
//! jitter, when the process lacks the privileges or the core does not exist.
//! Failures are logged as warnings and reported through the return value.

#![allow(unused_imports)] // Platform-specific code may not use all imports

use gpiobench_common::SchedPolicy;
use tracing::{debug, info, warn};

/// Pin the calling thread to `core`.
///
/// Returns `true` if the affinity was applied.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(core: usize) -> bool {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut cpu_set = CpuSet::new();
    if let Err(e) = cpu_set.set(core) {
        warn!(core, error = %e, "invalid CPU index");
        return false;
    }

    match sched_setaffinity(Pid::from_raw(0), &cpu_set) {
        Ok(()) => {
            debug!(core, "thread pinned");
            true
        }
        Err(e) if e == nix::errno::Errno::EINVAL => {
            warn!(core, "CPU does not exist or is offline; running unpinned");
            false
        }
        Err(e) => {
            warn!(core, error = %e, "sched_setaffinity failed; running unpinned");
            false
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(core: usize) -> bool {
    warn!(core, "CPU affinity not available on this platform");
    false
}

/// Lock all current and future memory pages.
///
/// Returns `true` if memory was locked.
#[cfg(target_os = "linux")]
pub fn lock_memory() -> bool {
    use nix::sys::mman::{mlockall, MlockAllFlags};

    debug!("Locking memory pages with mlockall");

    match mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
        Ok(()) => {
            info!("Memory locked");
            true
        }
        Err(nix::errno::Errno::EPERM) => {
            warn!(
                "mlockall failed with EPERM - running without CAP_IPC_LOCK capability. \
                 Page faults may disturb the measurement."
            );
            false
        }
        Err(e) => {
            warn!(error = %e, "mlockall failed");
            false
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn lock_memory() -> bool {
    warn!("mlockall not available on this platform");
    false
}

/// Apply `policy` at `priority` to the calling thread.
///
/// Returns the policy actually in effect, or `None` if the change was refused.
#[cfg(target_os = "linux")]
pub fn set_scheduler(policy: SchedPolicy, priority: u8) -> Option<SchedPolicy> {
    let linux_policy = match policy {
        SchedPolicy::Fifo => libc::SCHED_FIFO,
        SchedPolicy::Rr => libc::SCHED_RR,
        SchedPolicy::Other => return Some(SchedPolicy::Other),
    };

    // Clamp priority to valid range (1-99 for RT policies)
    let clamped = priority.clamp(1, 99);
    if clamped != priority {
        warn!(
            original = priority,
            clamped, "Scheduler priority clamped to valid range"
        );
    }

    let param = libc::sched_param {
        sched_priority: i32::from(clamped),
    };

    // SAFETY: pid 0 targets the calling thread and param outlives the call.
    let result = unsafe { libc::sched_setscheduler(0, linux_policy, &param) };

    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            warn!(
                ?policy,
                "sched_setscheduler failed with EPERM - running without RT privileges. \
                 Consider running with CAP_SYS_NICE capability or as root."
            );
        } else {
            warn!(?policy, error = %err, "sched_setscheduler failed");
        }
        return None;
    }

    debug!(?policy, priority = clamped, "real-time scheduler applied");
    Some(policy)
}

#[cfg(not(target_os = "linux"))]
pub fn set_scheduler(policy: SchedPolicy, priority: u8) -> Option<SchedPolicy> {
    if policy != SchedPolicy::Other {
        warn!(
            ?policy,
            priority, "Real-time scheduling not available on this platform"
        );
        return None;
    }
    Some(SchedPolicy::Other)
}

/// Number of CPUs the scheduler may run this process on.
#[must_use]
pub fn available_cores() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
