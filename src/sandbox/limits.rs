//! OS-level resource ceilings behind a capability interface.
//!
//! Kernel enforcement is platform-dependent, so ceilings are installed
//! through a trait the host selects at startup. The watchdog supervises
//! every unit regardless of which enforcer is active; these enforcers are
//! the first line of defense, not the only one.

use tokio::process::Command;

use crate::error::Result;

/// Hard resource ceilings for one execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ceilings {
    /// Wall/CPU time ceiling in milliseconds
    pub timeout_ms: u64,
    /// Memory ceiling in bytes
    pub memory_limit_bytes: u64,
}

/// Which ceilings an enforcer actually installs at the kernel level.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnforcedCeilings {
    pub cpu: bool,
    pub memory: bool,
}

/// Installs kernel-level ceilings on a unit before any submitted code runs.
pub trait LimitEnforcer: Send + Sync {
    /// Enforcer name (e.g. "rlimit", "none")
    fn name(&self) -> &str;

    /// The ceilings this enforcer can make the kernel enforce
    fn enforced(&self) -> EnforcedCeilings;

    /// Arm the command so the ceilings apply from the first instruction of
    /// the child process.
    fn apply(&self, cmd: &mut Command, ceilings: &Ceilings) -> Result<()>;
}

/// Select the strongest enforcer available on this platform.
pub fn create_enforcer() -> Box<dyn LimitEnforcer> {
    #[cfg(unix)]
    {
        Box::new(RlimitEnforcer)
    }
    #[cfg(not(unix))]
    {
        Box::new(NoopEnforcer)
    }
}

/// setrlimit-based enforcer: hard CPU-time and address-space ceilings set in
/// the child between fork and exec, plus bounds on process count, file size
/// and core dumps.
#[cfg(unix)]
pub struct RlimitEnforcer;

/// Cap on processes/threads the unit may hold, against fork bombs.
#[cfg(unix)]
const MAX_UNIT_PROCESSES: u64 = 64;

/// Cap on any single file the unit writes, including its result file.
#[cfg(unix)]
const MAX_UNIT_FILE_BYTES: u64 = 8 * 1024 * 1024;

#[cfg(unix)]
impl LimitEnforcer for RlimitEnforcer {
    fn name(&self) -> &str {
        "rlimit"
    }

    fn enforced(&self) -> EnforcedCeilings {
        EnforcedCeilings {
            cpu: true,
            memory: true,
        }
    }

    fn apply(&self, cmd: &mut Command, ceilings: &Ceilings) -> Result<()> {
        // RLIMIT_CPU only counts whole seconds; round up so short timeouts
        // still get a kernel ceiling. The watchdog handles the remainder.
        let cpu_secs = ceilings.timeout_ms.div_ceil(1000).max(1);
        let memory = ceilings.memory_limit_bytes;

        // pre_exec runs in the forked child only, before exec.
        unsafe {
            cmd.pre_exec(move || {
                set_rlimit(libc::RLIMIT_CPU as libc::c_int, cpu_secs)?;
                set_rlimit(libc::RLIMIT_AS as libc::c_int, memory)?;
                set_rlimit(libc::RLIMIT_NPROC as libc::c_int, MAX_UNIT_PROCESSES)?;
                set_rlimit(libc::RLIMIT_FSIZE as libc::c_int, MAX_UNIT_FILE_BYTES)?;
                set_rlimit(libc::RLIMIT_CORE as libc::c_int, 0)?;
                Ok(())
            });
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_rlimit(resource: libc::c_int, limit: u64) -> std::io::Result<()> {
    let rlim = libc::rlimit {
        rlim_cur: limit as libc::rlim_t,
        rlim_max: limit as libc::rlim_t,
    };
    if unsafe { libc::setrlimit(resource as _, &rlim) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Fallback enforcer for platforms without kernel-level ceilings; the
/// watchdog is the only line of defense there.
pub struct NoopEnforcer;

impl LimitEnforcer for NoopEnforcer {
    fn name(&self) -> &str {
        "none"
    }

    fn enforced(&self) -> EnforcedCeilings {
        EnforcedCeilings::default()
    }

    fn apply(&self, _cmd: &mut Command, _ceilings: &Ceilings) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_enforcer_reports_nothing_enforced() {
        let enforcer = NoopEnforcer;
        assert_eq!(enforcer.name(), "none");
        let enforced = enforcer.enforced();
        assert!(!enforced.cpu);
        assert!(!enforced.memory);
    }

    #[cfg(unix)]
    #[test]
    fn test_rlimit_enforcer_covers_both_ceilings() {
        let enforcer = RlimitEnforcer;
        let enforced = enforcer.enforced();
        assert!(enforced.cpu);
        assert!(enforced.memory);
    }
}
