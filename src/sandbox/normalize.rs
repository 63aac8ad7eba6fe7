//! Maps raw unit outcomes onto the fixed result taxonomy.
//!
//! Classification is pure and deterministic: the same raw outcome always
//! yields the same result. Only the submitted code's own failure is ever
//! surfaced in `error_detail`; host paths, environment and host stack
//! frames stay inside the host.

use crate::analyzer::PolicyVerdict;
use crate::sandbox::limits::Ceilings;
use crate::sandbox::unit::TerminationReason;
use crate::sandbox::{ExecutionResult, ExecutionStatus, ResourceUsage};

/// Marker appended to a stream cut at the output ceiling.
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

// Signal numbers the kernel uses when a ceiling fires (Linux numbering).
const SIGKILL: i32 = 9;
const SIGXCPU: i32 = 24;

/// Bounded capture of one output stream: at most the cap is retained, but
/// the total length produced is still counted so truncation is flagged
/// rather than silent.
#[derive(Debug, Default)]
pub struct CappedBuffer {
    bytes: Vec<u8>,
    total_len: usize,
}

impl CappedBuffer {
    pub fn push(&mut self, chunk: &[u8], cap: usize) {
        self.total_len += chunk.len();
        if self.bytes.len() < cap {
            let room = cap - self.bytes.len();
            self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
        }
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }

    fn render(&self, cap: usize) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.total_len > cap {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }

    /// Last non-empty line of the retained bytes, e.g. the final traceback
    /// line of a Python error.
    fn last_line(&self) -> Option<String> {
        String::from_utf8_lossy(&self.bytes)
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }
}

/// Raw outcome of one execution unit, before classification.
#[derive(Debug)]
pub struct RawOutcome {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub termination: TerminationReason,
    pub stdout: CappedBuffer,
    pub stderr: CappedBuffer,
    pub return_value: Option<serde_json::Value>,
    pub usage: ResourceUsage,
}

/// Classify a raw outcome into the uniform result structure.
pub fn normalize(raw: RawOutcome, ceilings: &Ceilings, max_output_bytes: usize) -> ExecutionResult {
    let error_line = raw.stderr.last_line();
    let stdout = raw.stdout.render(max_output_bytes);
    let stderr = raw.stderr.render(max_output_bytes);
    let usage = raw.usage;

    // Supervisor kills take precedence over whatever exit state the kernel
    // reports for the killed process.
    match raw.termination {
        TerminationReason::KilledTimeout => {
            return failure(
                ExecutionStatus::Timeout,
                stdout,
                stderr,
                usage,
                format!("execution exceeded the {} ms time ceiling", ceilings.timeout_ms),
            );
        }
        TerminationReason::KilledMemory => {
            return failure(
                ExecutionStatus::MemoryExceeded,
                stdout,
                stderr,
                usage,
                format!(
                    "execution exceeded the {} byte memory ceiling",
                    ceilings.memory_limit_bytes
                ),
            );
        }
        TerminationReason::KilledViolation => {
            return failure(
                ExecutionStatus::SecurityRejected,
                stdout,
                stderr,
                usage,
                "unit killed after policy violation".to_string(),
            );
        }
        TerminationReason::None | TerminationReason::Completed => {}
    }

    if raw.exit_code == Some(0) {
        return ExecutionResult {
            status: ExecutionStatus::Success,
            stdout,
            stderr,
            return_value: raw.return_value,
            resource_usage: usage,
            error_detail: None,
        };
    }

    // A kernel CPU ceiling surfaces as SIGXCPU, or SIGKILL at the hard
    // limit, rather than as a supervisor kill.
    if let Some(signal) = raw.signal {
        if (signal == SIGXCPU || signal == SIGKILL) && usage.elapsed_ms >= ceilings.timeout_ms {
            return failure(
                ExecutionStatus::Timeout,
                stdout,
                stderr,
                usage,
                format!("execution exceeded the {} ms time ceiling", ceilings.timeout_ms),
            );
        }
    }

    // An address-space ceiling surfaces inside Python as MemoryError.
    if let Some(line) = &error_line {
        if line.starts_with("MemoryError") || line.contains("MemoryError:") {
            return failure(
                ExecutionStatus::MemoryExceeded,
                stdout,
                stderr,
                usage,
                format!(
                    "execution exceeded the {} byte memory ceiling",
                    ceilings.memory_limit_bytes
                ),
            );
        }
    }

    if let Some(signal) = raw.signal {
        return failure(
            ExecutionStatus::RuntimeError,
            stdout,
            stderr,
            usage,
            format!("terminated by signal {signal}"),
        );
    }

    let detail = error_line.unwrap_or_else(|| {
        format!("exited with status {}", raw.exit_code.unwrap_or(-1))
    });
    failure(ExecutionStatus::RuntimeError, stdout, stderr, usage, detail)
}

/// Result for a request rejected by the policy analyzer. No unit was ever
/// created, so usage is zero and the streams are empty.
pub fn rejected(verdict: &PolicyVerdict) -> ExecutionResult {
    ExecutionResult {
        status: ExecutionStatus::SecurityRejected,
        stdout: String::new(),
        stderr: String::new(),
        return_value: None,
        resource_usage: ResourceUsage::default(),
        error_detail: verdict
            .summary()
            .or_else(|| Some("policy violation".to_string())),
    }
}

/// Result for a fault in the host itself (unit allocation, supervision),
/// as opposed to any fault of the submitted code.
pub fn internal_failure(detail: &str) -> ExecutionResult {
    ExecutionResult {
        status: ExecutionStatus::InternalError,
        stdout: String::new(),
        stderr: String::new(),
        return_value: None,
        resource_usage: ResourceUsage::default(),
        error_detail: Some(detail.to_string()),
    }
}

fn failure(
    status: ExecutionStatus,
    stdout: String,
    stderr: String,
    usage: ResourceUsage,
    detail: String,
) -> ExecutionResult {
    ExecutionResult {
        status,
        stdout,
        stderr,
        return_value: None,
        resource_usage: usage,
        error_detail: Some(detail),
    }
}
