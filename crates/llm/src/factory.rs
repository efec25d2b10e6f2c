//! LLM provider factory.
//!
//! Builds a client from the `llm` section of the application config.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiClient};
use crate::types::ProviderType;
use ragline_core::config::LlmSettings;
use ragline_core::AppResult;
use std::sync::Arc;

/// Create an LLM client for the configured provider.
///
/// # Errors
/// Returns `AppError::InvalidConfig` if the provider is unknown.
pub fn create_client(
    settings: &LlmSettings,
    api_key: Option<String>,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider = ProviderType::parse(&settings.provider)?;
    let endpoint = settings
        .endpoint
        .clone()
        .unwrap_or_else(|| provider.default_endpoint().to_string());

    tracing::debug!(provider = provider.as_str(), %endpoint, "Creating LLM client");

    match provider {
        ProviderType::Ollama => Ok(Arc::new(OllamaClient::with_base_url(endpoint))),
        ProviderType::OpenAi => Ok(Arc::new(OpenAiClient::new(endpoint, api_key))),
    }
}
