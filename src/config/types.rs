use serde::{Deserialize, Serialize};

/// Default CPU/wall time ceiling per request, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 2_000;

/// Default memory ceiling per request (256 MiB).
pub const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PycellConfig {
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Python interpreter executable name or path
    pub interpreter: String,
    /// Default CPU/wall time ceiling in milliseconds
    pub timeout_ms: u64,
    /// Default memory ceiling in bytes
    pub memory_limit_bytes: u64,
    /// Upper bound for caller-supplied timeouts
    pub max_timeout_ms: u64,
    /// Upper bound for caller-supplied memory limits
    pub max_memory_limit_bytes: u64,
    /// Captured stdout/stderr are truncated beyond this many bytes
    pub max_output_bytes: usize,
    /// Watchdog polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Maximum number of execution units running at the same time
    pub max_concurrent_units: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            max_timeout_ms: 30_000,
            max_memory_limit_bytes: 1024 * 1024 * 1024,
            max_output_bytes: 64 * 1024,
            poll_interval_ms: 25,
            max_concurrent_units: 8,
        }
    }
}

impl SandboxConfig {
    /// Resolve a caller-supplied timeout against the host default and cap.
    pub fn clamp_timeout_ms(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.timeout_ms)
            .clamp(1, self.max_timeout_ms)
    }

    /// Resolve a caller-supplied memory limit against the host default and cap.
    pub fn clamp_memory_limit(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.memory_limit_bytes)
            .clamp(1, self.max_memory_limit_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.timeout_ms, 2_000);
        assert_eq!(config.memory_limit_bytes, 256 * 1024 * 1024);
    }

    #[test]
    fn test_clamp_timeout() {
        let config = SandboxConfig::default();
        assert_eq!(config.clamp_timeout_ms(None), 2_000);
        assert_eq!(config.clamp_timeout_ms(Some(500)), 500);
        assert_eq!(config.clamp_timeout_ms(Some(0)), 1);
        assert_eq!(config.clamp_timeout_ms(Some(u64::MAX)), 30_000);
    }

    #[test]
    fn test_clamp_memory_limit() {
        let config = SandboxConfig::default();
        assert_eq!(config.clamp_memory_limit(None), 256 * 1024 * 1024);
        assert_eq!(
            config.clamp_memory_limit(Some(u64::MAX)),
            1024 * 1024 * 1024
        );
    }
}
