//! OpenAI-compatible chat completions provider.
//!
//! Works against api.openai.com and the many local servers that speak the
//! same protocol (vLLM, llama.cpp server, LM Studio).

use super::{classify_status, transport_error};
use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use ragline_core::{AppError, AppResult, LlmFailure};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Client for OpenAI-compatible endpoints.
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn to_chat_request<'a>(&self, request: &'a LlmRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        ChatRequest {
            model: &request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

/// Turn a decoded chat response into text, surfacing moderation refusals.
fn extract_completion(body: ChatResponse) -> AppResult<LlmResponse> {
    let choice = body.choices.into_iter().next().ok_or_else(|| {
        AppError::llm(LlmFailure::Other, "Completion response contained no choices")
    })?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(AppError::llm(
            LlmFailure::ContentFiltered,
            "Completion was blocked by the provider's content filter",
        ));
    }

    let usage = body
        .usage
        .map(|u| LlmUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(LlmResponse {
        content: choice.message.content.unwrap_or_default(),
        model: body.model,
        usage,
    })
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, "Sending chat completion request");

        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(&self.to_chat_request(request));
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error("OpenAI-compatible endpoint", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let reason = if error_text.contains("content_filter")
                || error_text.contains("content_policy")
            {
                LlmFailure::ContentFiltered
            } else {
                classify_status(status)
            };
            return Err(AppError::llm(
                reason,
                format!("Chat completion error ({}): {}", status, error_text),
            ));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            AppError::llm(
                LlmFailure::Other,
                format!("Failed to parse chat completion: {}", e),
            )
        })?;

        extract_completion(body)
    }
}
