//! Completion providers.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use ragline_core::{AppError, LlmFailure};
use reqwest::StatusCode;

/// Map an HTTP error status to a failure reason.
pub(crate) fn classify_status(status: StatusCode) -> LlmFailure {
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmFailure::RateLimited
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        LlmFailure::Timeout
    } else if status.is_server_error() {
        LlmFailure::Server
    } else {
        LlmFailure::Other
    }
}

/// Map a reqwest error (no response received) to an `AppError::Llm`.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> AppError {
    let reason = if err.is_timeout() {
        LlmFailure::Timeout
    } else if err.is_connect() || err.is_request() {
        LlmFailure::Transport
    } else {
        LlmFailure::Other
    };
    AppError::llm(
        reason,
        format!("Failed to send request to {}: {}", provider, err),
    )
}
