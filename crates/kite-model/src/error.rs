//! Error taxonomy for Kite.
//!
//! Each variant carries a `kind_tag()` matching the tag strings used in
//! `retryOn` sets, so retry-set membership is a plain enum-discriminant
//! comparison rather than a second parallel string taxonomy.

use thiserror::Error;

/// Errors produced while validating a ride's flow against its segment set,
/// before any segment body runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ride references unknown segment '{0}'")]
    UnknownSegment(String),

    #[error("parallel block at path {path} has no children")]
    EmptyParallel { path: String },

    #[error("segment '{0}' depends on itself")]
    SelfDependency(String),

    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("segment '{segment}' declares input '{artifact}' with no producer and no manifest entry")]
    MissingArtifact { segment: String, artifact: String },
}

impl ValidationError {
    pub fn kind_tag(&self) -> &'static str {
        match self {
            ValidationError::UnknownSegment(_) => "UnknownSegment",
            ValidationError::EmptyParallel { .. } => "EmptyParallel",
            ValidationError::SelfDependency(_) => "SelfDependency",
            ValidationError::Cycle { .. } => "Cycle",
            ValidationError::MissingArtifact { .. } => "MissingArtifact",
        }
    }
}

/// Errors produced while a ride is executing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("segment '{segment}' is missing required input '{artifact}'")]
    MissingInput { segment: String, artifact: String },

    #[error("segment '{segment}' did not produce declared output '{path}' for artifact '{artifact}'")]
    MissingOutput {
        segment: String,
        artifact: String,
        path: String,
    },

    #[error("segment '{segment}' timed out after {timeout_ms}ms")]
    Timeout { segment: String, timeout_ms: u64 },

    #[error("segment '{segment}' was cancelled")]
    Cancelled { segment: String },

    #[error("segment '{segment}' body failed: {message}")]
    BodyFailure { segment: String, message: String },

    #[error("hook for segment '{segment}' failed: {message}")]
    HookFailure { segment: String, message: String },

    #[error("required environment variable '{0}' is not set")]
    MissingEnv(String),
}

impl RuntimeError {
    pub fn kind_tag(&self) -> &'static str {
        match self {
            RuntimeError::MissingInput { .. } => "MissingInput",
            RuntimeError::MissingOutput { .. } => "MissingOutput",
            RuntimeError::Timeout { .. } => "Timeout",
            RuntimeError::Cancelled { .. } => "Cancelled",
            RuntimeError::BodyFailure { .. } => "BodyFailure",
            RuntimeError::HookFailure { .. } => "HookFailure",
            RuntimeError::MissingEnv(_) => "MissingEnv",
        }
    }

    /// `requireEnv`/`requireSecret` surface as `BodyFailure` per spec §7,
    /// while still letting callers distinguish the underlying cause.
    pub fn missing_env(key: impl Into<String>) -> Self {
        RuntimeError::MissingEnv(key.into())
    }

    /// Whether this error is eligible for retry when `retryOn` is empty,
    /// i.e. "retry on any non-cancellation failure". `Timeout` is treated
    /// identically to `BodyFailure` for retry purposes (spec §9 open
    /// question).
    pub fn retryable_by_default(&self) -> bool {
        !matches!(self, RuntimeError::Cancelled { .. })
    }
}

/// Top-level error type bridging validation, runtime, and I/O failures.
#[derive(Debug, Error)]
pub enum KiteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type KiteResult<T> = std::result::Result<T, KiteError>;
