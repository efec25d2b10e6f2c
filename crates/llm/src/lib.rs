//! LLM integration crate for ragline.
//!
//! A provider-agnostic completion interface. Providers classify every failure
//! with a [`ragline_core::LlmFailure`] reason so the answer gateway can tell
//! retryable outages from refusals.
//!
//! # Providers
//! - **Ollama**: local LLM runtime (default)
//! - **OpenAI-compatible**: hosted or self-hosted chat completion servers
//!
//! # Example
//! ```no_run
//! use ragline_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "qwen2.5:1.5b");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
pub use types::ProviderType;
