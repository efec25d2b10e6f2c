//! Provider identification.

use ragline_core::{AppError, AppResult};

/// Supported completion backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    /// Local Ollama runtime
    Ollama,
    /// Any endpoint speaking the OpenAI chat completions protocol
    OpenAi,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "openai-compatible" => Ok(Self::OpenAi),
            other => Err(AppError::InvalidConfig(format!(
                "Unknown LLM provider: {}. Supported: ollama, openai",
                other
            ))),
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }

    /// Endpoint used when the configuration names none.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }
}
