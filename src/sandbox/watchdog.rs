//! Portable fallback supervision of running execution units.
//!
//! Kernel ceilings may be unavailable or only partially effective, so every
//! unit is also watched from the host side: wall-clock time and resident
//! memory are polled at a fixed interval and a breach triggers a forced
//! kill. Whichever mechanism fires first wins; both converge on the same
//! result status.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use crate::sandbox::limits::Ceilings;

/// Ceiling breach detected by the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breach {
    WallClock,
    Memory,
}

/// One memory reading for a live unit.
#[derive(Debug, Clone, Copy)]
pub struct MemorySample {
    pub rss_bytes: u64,
    pub peak_rss_bytes: u64,
}

/// Samples resource usage of a live execution unit.
#[async_trait]
pub trait UsageProbe: Send + Sync {
    /// Current and peak resident set size, if observable on this platform.
    async fn sample(&self, pid: u32) -> Option<MemorySample>;
}

/// Probe backed by `/proc/<pid>/status` (VmRSS / VmHWM).
pub struct ProcStatusProbe;

#[async_trait]
impl UsageProbe for ProcStatusProbe {
    async fn sample(&self, pid: u32) -> Option<MemorySample> {
        #[cfg(target_os = "linux")]
        {
            let status = tokio::fs::read_to_string(format!("/proc/{pid}/status"))
                .await
                .ok()?;
            parse_proc_status(&status)
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = pid;
            None
        }
    }
}

/// Parse VmRSS/VmHWM lines out of a /proc status blob.
fn parse_proc_status(status: &str) -> Option<MemorySample> {
    let mut rss = None;
    let mut peak = None;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            rss = parse_kib_field(rest);
        } else if let Some(rest) = line.strip_prefix("VmHWM:") {
            peak = parse_kib_field(rest);
        }
    }
    let rss_bytes = rss?;
    Some(MemorySample {
        rss_bytes,
        peak_rss_bytes: peak.unwrap_or(rss_bytes),
    })
}

fn parse_kib_field(field: &str) -> Option<u64> {
    field
        .trim()
        .trim_end_matches("kB")
        .trim()
        .parse::<u64>()
        .ok()
        .map(|kib| kib * 1024)
}

/// Supervises one execution unit: polls elapsed wall time and memory at a
/// fixed interval and reports the first ceiling breach.
pub struct Watchdog {
    ceilings: Ceilings,
    poll_interval: Duration,
    probe: Box<dyn UsageProbe>,
}

impl Watchdog {
    pub fn new(ceilings: Ceilings, poll_interval: Duration) -> Self {
        Self {
            ceilings,
            poll_interval,
            probe: Box::new(ProcStatusProbe),
        }
    }

    /// Use a custom probe instead of the platform default.
    pub fn with_probe(
        ceilings: Ceilings,
        poll_interval: Duration,
        probe: Box<dyn UsageProbe>,
    ) -> Self {
        Self {
            ceilings,
            poll_interval,
            probe,
        }
    }

    /// Poll until a ceiling is breached. Never resolves while the unit stays
    /// within bounds; the caller races this against unit completion.
    ///
    /// Every memory reading is folded into `peak_cell`, which outlives the
    /// kill and feeds the reported resource usage.
    pub async fn watch(&self, pid: u32, started: Instant, peak_cell: &AtomicU64) -> Breach {
        loop {
            tokio::time::sleep(self.poll_interval).await;

            let elapsed_ms = started.elapsed().as_millis() as u64;
            if elapsed_ms > self.ceilings.timeout_ms {
                warn!(
                    pid,
                    elapsed_ms,
                    limit_ms = self.ceilings.timeout_ms,
                    "Wall-clock ceiling breached"
                );
                return Breach::WallClock;
            }

            if let Some(sample) = self.probe.sample(pid).await {
                let observed = sample.peak_rss_bytes.max(sample.rss_bytes);
                peak_cell.fetch_max(observed, Ordering::Relaxed);
                if observed > self.ceilings.memory_limit_bytes {
                    warn!(
                        pid,
                        observed_bytes = observed,
                        limit_bytes = self.ceilings.memory_limit_bytes,
                        "Memory ceiling breached"
                    );
                    return Breach::Memory;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_parse_proc_status() {
        let status = "Name:\tpython3\nVmHWM:\t    2048 kB\nVmRSS:\t    1024 kB\nThreads:\t1\n";
        let sample = parse_proc_status(status).unwrap();
        assert_eq!(sample.rss_bytes, 1024 * 1024);
        assert_eq!(sample.peak_rss_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn test_parse_proc_status_without_rss() {
        assert!(parse_proc_status("Name:\tpython3\n").is_none());
    }

    struct FixedProbe(u64);

    #[async_trait]
    impl UsageProbe for FixedProbe {
        async fn sample(&self, _pid: u32) -> Option<MemorySample> {
            Some(MemorySample {
                rss_bytes: self.0,
                peak_rss_bytes: self.0,
            })
        }
    }

    #[tokio::test]
    async fn test_memory_breach_detected() {
        let ceilings = Ceilings {
            timeout_ms: 60_000,
            memory_limit_bytes: 1024,
        };
        let watchdog = Watchdog::with_probe(
            ceilings,
            Duration::from_millis(1),
            Box::new(FixedProbe(4096)),
        );
        let peak = AtomicU64::new(0);
        let breach = watchdog.watch(1, Instant::now(), &peak).await;
        assert_eq!(breach, Breach::Memory);
        assert_eq!(peak.load(Ordering::Relaxed), 4096);
    }

    #[tokio::test]
    async fn test_wall_clock_breach_detected() {
        let ceilings = Ceilings {
            timeout_ms: 5,
            memory_limit_bytes: u64::MAX,
        };
        let watchdog = Watchdog::with_probe(
            ceilings,
            Duration::from_millis(2),
            Box::new(FixedProbe(0)),
        );
        let peak = AtomicU64::new(0);
        let breach = watchdog.watch(1, Instant::now(), &peak).await;
        assert_eq!(breach, Breach::WallClock);
    }
}
