use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::sandbox::limits::Ceilings;

/// Why an execution unit stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminationReason {
    #[default]
    None,
    Completed,
    KilledTimeout,
    KilledMemory,
    KilledViolation,
}

/// The isolated runtime instance created to run one request.
///
/// Owned exclusively by the execution host for its lifetime, 1:1 with its
/// request, never reused. Destroyed (and the child process reclaimed) when
/// the request finishes or is killed.
#[derive(Debug)]
pub struct ExecutionUnit {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ceilings: Ceilings,
    started: Instant,
    peak_memory: Arc<AtomicU64>,
    termination: TerminationReason,
}

impl ExecutionUnit {
    pub fn new(ceilings: Ceilings) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ceilings,
            started: Instant::now(),
            peak_memory: Arc::new(AtomicU64::new(0)),
            termination: TerminationReason::None,
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Shared cell the watchdog updates with the highest memory reading it
    /// observes while the unit runs.
    pub fn peak_memory_cell(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.peak_memory)
    }

    pub fn peak_memory_bytes(&self) -> u64 {
        self.peak_memory.load(Ordering::Relaxed)
    }

    pub fn mark(&mut self, reason: TerminationReason) {
        self.termination = reason;
    }

    pub fn termination(&self) -> TerminationReason {
        self.termination
    }
}
