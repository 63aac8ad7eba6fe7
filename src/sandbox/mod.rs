//! Resource-bounded execution of policy-checked Python code.

mod driver;
mod host;
mod limits;
mod normalize;
mod unit;
mod watchdog;

pub use host::ExecutionHost;
pub use limits::{create_enforcer, Ceilings, EnforcedCeilings, LimitEnforcer, NoopEnforcer};
pub use normalize::TRUNCATION_MARKER;
pub use unit::{ExecutionUnit, TerminationReason};
pub use watchdog::{Breach, MemorySample, UsageProbe, Watchdog};

#[cfg(unix)]
pub use limits::RlimitEnforcer;

use serde::{Deserialize, Serialize};

/// A single code-execution request. Immutable once submitted; omitted
/// limits take the host defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Submitted source text
    pub code: String,
    /// Wall/CPU time ceiling in milliseconds
    pub timeout_ms: Option<u64>,
    /// Memory ceiling in bytes
    pub memory_limit_bytes: Option<u64>,
    /// Text piped to the unit's standard input
    pub stdin: Option<String>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            timeout_ms: None,
            memory_limit_bytes: None,
            stdin: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_memory_limit_bytes(mut self, memory_limit_bytes: u64) -> Self {
        self.memory_limit_bytes = Some(memory_limit_bytes);
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }
}

/// Final status of one execution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    SecurityRejected,
    Timeout,
    MemoryExceeded,
    RuntimeError,
    InternalError,
}

/// Resource consumption observed for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub elapsed_ms: u64,
    pub peak_memory_bytes: u64,
}

/// Uniform result of one execution request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    /// Final-expression value, present only on success
    pub return_value: Option<serde_json::Value>,
    pub resource_usage: ResourceUsage,
    /// Present when status is not `success`
    pub error_detail: Option<String>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}
