use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::analyzer;
use crate::config::types::SandboxConfig;
use crate::error::{PycellError, Result};
use crate::sandbox::driver;
use crate::sandbox::limits::{create_enforcer, Ceilings, LimitEnforcer};
use crate::sandbox::normalize::{self, CappedBuffer, RawOutcome};
use crate::sandbox::unit::{ExecutionUnit, TerminationReason};
use crate::sandbox::watchdog::{Breach, Watchdog};
use crate::sandbox::{ExecutionRequest, ExecutionResult, ResourceUsage};

/// Executes policy-checked code in isolated child processes.
///
/// One host serves many concurrent requests; every request gets its own
/// execution unit and the units share nothing with each other or with the
/// host beyond the bounded admission pool. Requests are independent and
/// unordered relative to each other.
pub struct ExecutionHost {
    config: SandboxConfig,
    interpreter: PathBuf,
    enforcer: Box<dyn LimitEnforcer>,
    admission: Arc<Semaphore>,
}

impl ExecutionHost {
    /// Create a host, resolving the configured Python interpreter.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let interpreter = which::which(&config.interpreter).map_err(|e| {
            PycellError::InterpreterNotFound(format!("{}: {}", config.interpreter, e))
        })?;
        let enforcer = create_enforcer();
        let admission = Arc::new(Semaphore::new(config.max_concurrent_units.max(1)));

        info!(
            interpreter = %interpreter.display(),
            enforcer = enforcer.name(),
            max_units = config.max_concurrent_units,
            "Execution host initialized"
        );

        Ok(Self {
            config,
            interpreter,
            enforcer,
            admission,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(SandboxConfig::default())
    }

    /// Run one request through the full pipeline: analyze, admit, execute
    /// under supervision, normalize.
    ///
    /// Never returns an error: every fault is folded into the result status,
    /// and only faults of the host itself (unit allocation, supervision)
    /// surface as `internal_error`. Dropping the returned future cancels the
    /// request; a live unit is killed and reclaimed on drop.
    pub async fn run(&self, request: ExecutionRequest) -> ExecutionResult {
        let verdict = analyzer::analyze(&request.code);
        if !verdict.allowed {
            debug!(
                violations = verdict.violations.len(),
                "Request rejected by policy"
            );
            return normalize::rejected(&verdict);
        }

        match self.execute(&request).await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "Execution unit failed inside the host");
                normalize::internal_failure(&err.to_string())
            }
        }
    }

    /// Spawn and supervise one execution unit. Called only with an allowing
    /// verdict.
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        let _permit = self
            .admission
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PycellError::AdmissionClosed)?;

        let ceilings = Ceilings {
            timeout_ms: self.config.clamp_timeout_ms(request.timeout_ms),
            memory_limit_bytes: self.config.clamp_memory_limit(request.memory_limit_bytes),
        };
        let mut unit = ExecutionUnit::new(ceilings);
        debug!(
            unit = %unit.id,
            started = %unit.started_at,
            timeout_ms = ceilings.timeout_ms,
            memory_limit_bytes = ceilings.memory_limit_bytes,
            "Allocated execution unit"
        );

        let result_file = tempfile::NamedTempFile::new()
            .map_err(|e| PycellError::UnitAllocation(format!("result file: {e}")))?;

        let mut cmd = Command::new(&self.interpreter);
        // -I: isolated mode, no env-based configuration, no user site dir
        cmd.arg("-I")
            .arg("-X")
            .arg("utf8")
            .arg("-c")
            .arg(driver::PYTHON_DRIVER)
            .arg(&request.code)
            .arg(result_file.path());
        cmd.env_clear();
        cmd.stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        self.enforcer.apply(&mut cmd, &ceilings)?;

        let mut child = cmd
            .spawn()
            .map_err(|e| PycellError::UnitAllocation(format!("spawn: {e}")))?;

        if let Some(input) = &request.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                let bytes = input.clone().into_bytes();
                tokio::spawn(async move {
                    let _ = stdin.write_all(&bytes).await;
                    let _ = stdin.shutdown().await;
                });
            }
        }

        let cap = self.config.max_output_bytes;
        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| PycellError::UnitAllocation("stdout pipe missing".to_string()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| PycellError::UnitAllocation("stderr pipe missing".to_string()))?;
        let stdout_task = tokio::spawn(read_capped(stdout_pipe, cap));
        let stderr_task = tokio::spawn(read_capped(stderr_pipe, cap));

        let pid = child.id().unwrap_or_default();
        let watchdog = Watchdog::new(
            ceilings,
            Duration::from_millis(self.config.poll_interval_ms.max(1)),
        );
        let peak_cell = unit.peak_memory_cell();

        // Race unit completion against the watchdog; whichever ceiling
        // mechanism fires first wins.
        let waited = tokio::select! {
            status = child.wait() => Some(status.map_err(PycellError::Io)?),
            breach = watchdog.watch(pid, unit.started(), peak_cell.as_ref()) => {
                unit.mark(match breach {
                    Breach::WallClock => TerminationReason::KilledTimeout,
                    Breach::Memory => TerminationReason::KilledMemory,
                });
                None
            }
        };

        let exit_status = match waited {
            Some(status) => {
                unit.mark(TerminationReason::Completed);
                status
            }
            None => {
                if let Err(e) = child.start_kill() {
                    debug!(unit = %unit.id, error = %e, "Kill raced unit exit");
                }
                child.wait().await.map_err(PycellError::Io)?
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        let usage = ResourceUsage {
            elapsed_ms: unit.elapsed_ms(),
            peak_memory_bytes: unit.peak_memory_bytes(),
        };

        let return_value = if exit_status.success() {
            tokio::fs::read_to_string(result_file.path())
                .await
                .ok()
                .and_then(|raw| driver::decode_return_value(&raw))
        } else {
            None
        };

        let raw = RawOutcome {
            exit_code: exit_status.code(),
            signal: exit_signal(&exit_status),
            termination: unit.termination(),
            stdout,
            stderr,
            return_value,
            usage,
        };

        debug!(
            unit = %unit.id,
            exit_code = ?raw.exit_code,
            signal = ?raw.signal,
            elapsed_ms = usage.elapsed_ms,
            peak_memory_bytes = usage.peak_memory_bytes,
            "Execution unit finished"
        );

        Ok(normalize::normalize(raw, &ceilings, cap))
    }
}

/// Drain a pipe into a bounded buffer. Reading continues past the cap so the
/// child never blocks on a full pipe, but only the capped prefix is kept.
async fn read_capped<R>(mut pipe: R, cap: usize) -> CappedBuffer
where
    R: AsyncRead + Unpin,
{
    let mut buffer = CappedBuffer::default();
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buffer.push(&chunk[..n], cap),
            // A broken pipe after a kill is normal teardown
            Err(_) => break,
        }
    }
    buffer
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
