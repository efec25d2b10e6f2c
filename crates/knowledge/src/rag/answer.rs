//! Answer generation over retrieved context.

use crate::rag::types::{Citation, RagAnswer, RetrievalResult};
use ragline_core::AppConfig;
use ragline_core::{AppError, AppResult, LlmFailure, RetryError, RetryPolicy};
use ragline_llm::{LlmClient, LlmRequest};
use ragline_prompt::{build_prompt, ChatTurn, PromptDefinition};
use std::sync::Arc;
use std::time::Duration;

/// One call plus one retry.
const GENERATION_ATTEMPTS: u32 = 2;

/// Generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Bound on a single LLM call
    pub timeout: Duration,
    /// Delay before the retry
    pub retry_delay: Duration,
    /// Below this top score the prompt asks the model to be cautious
    pub confidence_threshold: f32,
}

impl GatewayConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        let llm = &config.llm;
        Self {
            model: llm.model.clone(),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            timeout: config.rag.llm_timeout(),
            retry_delay: Duration::from_millis(config.rag.retry_initial_delay_ms),
            confidence_threshold: config.rag.confidence_threshold,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

/// Formats retrieved context into a prompt and asks the LLM for an answer.
#[derive(Clone)]
pub struct Gateway {
    client: Arc<dyn LlmClient>,
    prompt: PromptDefinition,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(client: Arc<dyn LlmClient>, prompt: PromptDefinition, config: GatewayConfig) -> Self {
        Self {
            client,
            prompt,
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Generate an answer citing the chunks in `retrieval`.
    ///
    /// Each call is bounded by the configured timeout. Timeouts and other
    /// transient failures are retried once with the same prompt; a
    /// content-filtered response is not retried.
    ///
    /// # Errors
    /// `GenerationFailed` with the failure reason and the cited chunk ids.
    pub async fn answer(
        &self,
        query: &str,
        retrieval: &RetrievalResult,
        history: &[ChatTurn],
    ) -> AppResult<RagAnswer> {
        if retrieval.is_empty() {
            tracing::info!("Nothing retrieved, answering without the model");
            return Ok(RagAnswer::no_information(query));
        }

        let max_score = retrieval.max_score().unwrap_or(0.0);
        let low_confidence = max_score < self.config.confidence_threshold;
        let built = build_prompt(
            &self.prompt,
            query,
            &retrieval.context_entries(),
            history,
            low_confidence,
        )?;

        let request = LlmRequest::new(built.user, &self.config.model)
            .with_system(built.system)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        tracing::info!(
            provider = self.client.provider_name(),
            model = %self.config.model,
            context_chunks = built.citations.len(),
            max_score,
            low_confidence,
            "Generating answer"
        );

        let policy = RetryPolicy::new(GENERATION_ATTEMPTS, self.config.retry_delay);
        let mut attempts = 0;
        let outcome = policy
            .run("llm.generate", |attempt| {
                attempts = attempt;
                self.complete_once(&request)
            })
            .await;

        match outcome {
            Ok(response) => {
                let citations = retrieval
                    .hits
                    .iter()
                    .map(|hit| Citation::from_hit(hit, &response.content))
                    .collect();
                Ok(RagAnswer {
                    answer: response.content,
                    citations,
                    max_score,
                    low_confidence,
                    attempts,
                    model: Some(response.model),
                })
            }
            Err(err) => {
                let last = match err {
                    RetryError::Exhausted { last, .. } => last,
                    RetryError::Fatal(err) => err,
                };
                let (reason, message) = match last {
                    AppError::Llm { reason, message } => (reason, message),
                    other => (LlmFailure::Other, other.to_string()),
                };
                tracing::warn!(attempts, %reason, "Generation failed");
                Err(AppError::GenerationFailed {
                    attempts,
                    reason,
                    message,
                    cited_chunks: built.citations,
                })
            }
        }
    }

    async fn complete_once(&self, request: &LlmRequest) -> AppResult<ragline_llm::LlmResponse> {
        match tokio::time::timeout(self.config.timeout, self.client.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::llm(
                LlmFailure::Timeout,
                format!("no response within {:?}", self.config.timeout),
            )),
        }
    }
}
