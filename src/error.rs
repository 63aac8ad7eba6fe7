use thiserror::Error;

#[derive(Error, Debug)]
pub enum PycellError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    // Execution unit allocation errors
    #[error("Python interpreter not found: {0}")]
    InterpreterNotFound(String),

    #[error("Failed to allocate execution unit: {0}")]
    UnitAllocation(String),

    #[error("Admission pool closed")]
    AdmissionClosed,

    #[error("Resource limit enforcement failed: {0}")]
    LimitEnforcement(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    // Generic wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PycellError {
    /// Allocation-layer failures may succeed on a retry of the exact same
    /// request; everything else is a property of the request itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UnitAllocation(_) | Self::AdmissionClosed)
    }
}

pub type Result<T> = std::result::Result<T, PycellError>;
