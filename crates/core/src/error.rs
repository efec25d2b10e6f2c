//! Error types for ragline.
//!
//! One enum covers the whole pipeline. Variants map onto the failure classes
//! callers need to tell apart: fatal configuration problems, transient
//! backend outages that are worth retrying, data errors, and the non-fatal
//! "nothing matched" outcome of a query.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Why a call to the language model did not produce text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmFailure {
    Timeout,
    RateLimited,
    ContentFiltered,
    Transport,
    Server,
    Other,
}

impl LlmFailure {
    /// Failures that may succeed when the same request is sent again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::Transport | Self::Server
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::ContentFiltered => "content_filtered",
            Self::Transport => "transport",
            Self::Server => "server",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for LlmFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for ragline.
///
/// Library code never panics on bad input; every failure is represented here
/// and propagated with `?`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Rejected configuration (chunk geometry, unknown provider, ...)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The embedding model could not be loaded or reached
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// The embedding model returned something unusable
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The vector store could not be reached
    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// A vector does not match the collection's declared dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The query matched nothing (empty collection or filter excluded all)
    #[error("No results matched the query")]
    NoResults,

    /// A single failed call to the language model
    #[error("LLM error ({reason}): {message}")]
    Llm { reason: LlmFailure, message: String },

    /// Generation gave up; carries the chunks that were cited in the prompt
    #[error("Generation failed after {attempts} attempt(s) ({reason}): {message}")]
    GenerationFailed {
        attempts: u32,
        reason: LlmFailure,
        message: String,
        cited_chunks: Vec<String>,
    },

    /// The operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Vector store errors that are not connectivity problems
    #[error("Index error: {0}")]
    Index(String),

    /// Prompt template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Shorthand for a single LLM failure.
    pub fn llm(reason: LlmFailure, message: impl Into<String>) -> Self {
        Self::Llm {
            reason,
            message: message.into(),
        }
    }

    /// Whether retrying the failed operation can help.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ModelUnavailable(_) | Self::IndexUnavailable(_) => true,
            Self::Llm { reason, .. } => reason.is_transient(),
            _ => false,
        }
    }

    /// Short machine-readable category, used in logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::Encoding(_) => "encoding_error",
            Self::IndexUnavailable(_) => "index_unavailable",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::NoResults => "no_results",
            Self::Llm { .. } => "llm_error",
            Self::GenerationFailed { .. } => "generation_failed",
            Self::Cancelled => "cancelled",
            Self::Io(_) => "io",
            Self::Index(_) => "index_error",
            Self::Prompt(_) => "prompt_error",
            Self::Serialization(_) => "serialization",
            Self::Other(_) => "other",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
