//! Structured error types for the pipeline core.
//!
//! Only two failure classes are ever visible to callers: bad input and bad
//! configuration. Every LLM-side failure is absorbed into a degraded
//! (`method = fallback`) response and never propagates as an error.

/// Caller-visible pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Empty or malformed request content — surfaced immediately, no
    /// fallback is attempted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Rule-table or threshold misconfiguration — raised at load time,
    /// never per request.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
