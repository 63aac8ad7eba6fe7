pub mod analyzer;
pub mod config;
pub mod error;
pub mod sandbox;

pub use analyzer::{analyze, PolicyVerdict, RuleId, Violation};
pub use error::{PycellError, Result};
pub use sandbox::{
    ExecutionHost, ExecutionRequest, ExecutionResult, ExecutionStatus, ResourceUsage,
};
