//! Shared fixtures: a scripted LLM client and an in-memory pipeline.

use crate::chunk::Chunker;
use crate::embeddings::providers::HashedProvider;
use crate::embeddings::ModelHandle;
use crate::memory_index::MemoryIndex;
use crate::pipeline::RagPipeline;
use crate::rag::{Gateway, GatewayConfig, RetrieverConfig};
use crate::types::Metadata;
use crate::vector_index::{CollectionSpec, SearchHit};
use ragline_core::{AppError, AppResult, LlmFailure, SimilarityMetric};
use ragline_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use ragline_prompt::PromptDefinition;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DIM: usize = 64;

/// What the scripted client does on its next call.
pub enum Reply {
    Text(&'static str),
    Fail(LlmFailure),
    /// Answer only after sleeping
    Stall(Duration),
}

#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();

        let content = match reply {
            None => "ok",
            Some(Reply::Text(text)) => text,
            Some(Reply::Fail(reason)) => return Err(AppError::llm(reason, "scripted failure")),
            Some(Reply::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                "late"
            }
        };

        Ok(LlmResponse {
            content: content.to_string(),
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }
}

pub fn gateway_config() -> GatewayConfig {
    GatewayConfig {
        model: "test-model".to_string(),
        temperature: 0.0,
        max_tokens: 128,
        timeout: Duration::from_millis(100),
        retry_delay: Duration::from_millis(1),
        confidence_threshold: 0.3,
    }
}

pub fn gateway(client: Arc<ScriptedClient>) -> Gateway {
    Gateway::new(client, PromptDefinition::default(), gateway_config())
}

pub fn hashed_model() -> Arc<ModelHandle> {
    Arc::new(ModelHandle::preloaded(Arc::new(HashedProvider::new(DIM))))
}

pub fn memory_index() -> Arc<MemoryIndex> {
    Arc::new(MemoryIndex::new(CollectionSpec::new(
        "test",
        DIM,
        SimilarityMetric::Cosine,
    )))
}

/// In-memory pipeline with the hashed embedder.
pub fn pipeline_with(
    client: Arc<ScriptedClient>,
    chunker: Chunker,
    retriever: RetrieverConfig,
) -> RagPipeline {
    RagPipeline::from_parts(hashed_model(), memory_index(), chunker, retriever, gateway(client))
}

pub fn pipeline(client: Arc<ScriptedClient>) -> RagPipeline {
    pipeline_with(
        client,
        Chunker::new(200, 20).unwrap(),
        RetrieverConfig::default(),
    )
}

pub fn hit(id: &str, score: f32, text: &str) -> SearchHit {
    SearchHit {
        id: id.to_string(),
        source_id: "notes.md".to_string(),
        position: 0,
        score,
        text: text.to_string(),
        metadata: Metadata::new(),
    }
}
