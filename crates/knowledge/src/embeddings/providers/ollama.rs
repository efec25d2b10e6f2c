//! Ollama Embedding Provider
//!
//! Semantic embeddings via Ollama's local API using models like
//! `nomic-embed-text`. Requests go to the batch `/api/embed` endpoint and are
//! retried with exponential backoff on connection and server failures.

use crate::embeddings::{EmbeddingConfig, EmbeddingProvider};
use async_trait::async_trait;
use ragline_core::{AppError, AppResult, RetryPolicy};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const EMBED_ENDPOINT: &str = "/api/embed";

/// Initial backoff between attempts
const INITIAL_BACKOFF_MS: u64 = 100;

/// Ollama embedding provider using local API
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    /// Create the provider and verify that the model answers with vectors of
    /// the configured dimension.
    ///
    /// # Errors
    /// * `ModelUnavailable` if Ollama is unreachable or the model is missing
    /// * `DimensionMismatch` if the model's vectors have another length
    pub async fn new(config: EmbeddingConfig) -> AppResult<Self> {
        let provider = Self::unverified(&config)?;
        provider.verify_connection().await?;
        Ok(provider)
    }

    /// Create the provider without contacting the server.
    pub fn unverified(config: &EmbeddingConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                AppError::ModelUnavailable(format!("Failed to create HTTP client for Ollama: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.endpoint_or_default(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            retry: RetryPolicy::new(config.max_retries, Duration::from_millis(INITIAL_BACKOFF_MS)),
        })
    }

    #[instrument(skip(self), fields(model = %self.model))]
    async fn verify_connection(&self) -> AppResult<()> {
        debug!("Verifying Ollama connection at {}", self.base_url);

        let probe = vec!["test connection".to_string()];
        let embedding = self
            .request_with_retries(&probe)
            .await
            .map_err(|e| {
                AppError::ModelUnavailable(format!(
                    "Ollama not available at {} ({}). Ensure Ollama is running and run: ollama pull {}",
                    self.base_url, e, self.model
                ))
            })?
            .pop()
            .unwrap_or_default();

        if embedding.len() != self.dimensions {
            return Err(AppError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }

        debug!("Ollama connection verified, model '{}' ready", self.model);
        Ok(())
    }

    async fn request_with_retries(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let vectors = self
            .retry
            .run("ollama embed", |_| self.request(texts))
            .await?;
        Ok(vectors)
    }

    /// One request, no retries.
    #[instrument(skip(self, texts), fields(batch = texts.len()))]
    async fn request(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let url = format!("{}{}", self.base_url, EMBED_ENDPOINT);
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ModelUnavailable(format!("Failed to reach Ollama: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(status_error(status, &message));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| AppError::Encoding(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(body.embeddings)
    }
}

/// Server-side failures and missing models are worth retrying; anything else
/// in the 4xx range means the request itself is wrong.
fn status_error(status: StatusCode, message: &str) -> AppError {
    let text = format!("Ollama API error ({}): {}", status, message);
    if status.is_server_error() || status == StatusCode::NOT_FOUND {
        AppError::ModelUnavailable(text)
    } else {
        AppError::Encoding(text)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), provider = "ollama", model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_with_retries(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            endpoint: Some("http://127.0.0.1:9/".to_string()),
            dimensions: 768,
            request_timeout_seconds: 2,
            max_retries: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_unverified_trims_endpoint() {
        let provider = OllamaProvider::unverified(&unreachable_config()).unwrap();
        assert_eq!(provider.base_url, "http://127.0.0.1:9");
        assert_eq!(provider.dimensions(), 768);
        assert_eq!(provider.model_name(), "nomic-embed-text");
    }

    #[test]
    fn test_status_error_classification() {
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            AppError::ModelUnavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "model not found"),
            AppError::ModelUnavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad input"),
            AppError::Encoding(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_model_unavailable() {
        let err = OllamaProvider::new(unreachable_config()).await.unwrap_err();
        assert!(matches!(err, AppError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let provider = OllamaProvider::unverified(&unreachable_config()).unwrap();
        assert!(provider.embed_batch(&[]).await.unwrap().is_empty());
    }
}
