//! Pipeline facade.
//!
//! [`RagPipeline`] wires the embedding model, the vector index, ingestion,
//! retrieval and answer generation together from an [`AppConfig`].

use crate::chunk::Chunker;
use crate::embeddings::{Embedder, EmbeddingConfig, ModelHandle};
use crate::filter::Filter;
use crate::ingest::{load_documents, IngestReport, Ingestor};
use crate::lancedb_index::LanceDbIndex;
use crate::memory_index::MemoryIndex;
use crate::rag::{
    Gateway, GatewayConfig, Query, RagAnswer, RetrievalResult, Retriever, RetrieverConfig,
};
use crate::types::Document;
use crate::vector_index::{CollectionSpec, IndexStats, IndexedChunk, RetryingIndex, VectorIndex};
use ragline_core::{AppConfig, AppError, AppResult, IndexBackend};
use ragline_llm::create_client;
use ragline_prompt::{load_prompt, ChatTurn, DEFAULT_PROMPT_ID};
use std::path::PathBuf;
use std::sync::Arc;

/// Ingestion and querying over one collection.
#[derive(Clone)]
pub struct RagPipeline {
    model: Arc<ModelHandle>,
    index: Arc<dyn VectorIndex>,
    ingestor: Ingestor,
    retriever: Retriever,
    gateway: Gateway,
}

impl RagPipeline {
    /// Build every component from `config`.
    ///
    /// The embedding model is loaded on first use; the collection is
    /// created (or its dimension checked) here.
    ///
    /// # Errors
    /// * `InvalidConfig` for inconsistent settings or an unknown provider
    /// * `IndexUnavailable` or `DimensionMismatch` from opening the collection
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let model = Arc::new(ModelHandle::new(EmbeddingConfig::from_app(config)));
        let spec = CollectionSpec::new(
            config.index.collection.clone(),
            config.rag.embedding_dimension,
            config.rag.similarity_metric,
        );
        let policy = config.rag.retry_policy();
        let timeout = config.index.request_timeout();

        let index: Arc<dyn VectorIndex> = match config.index.backend {
            IndexBackend::Memory => Arc::new(
                RetryingIndex::new(MemoryIndex::new(spec), policy).with_timeout(timeout),
            ),
            IndexBackend::Lancedb => {
                if config.index.uri.is_none() {
                    config.ensure_data_dir()?;
                }
                let uri = config.index_uri();
                tracing::debug!(%uri, "Using LanceDB index");
                Arc::new(
                    RetryingIndex::new(LanceDbIndex::new(uri, spec), policy).with_timeout(timeout),
                )
            }
        };

        let client = create_client(&config.llm, config.resolve_api_key())?;
        let prompt = load_prompt(&config.data_dir(), DEFAULT_PROMPT_ID)?;
        let gateway = Gateway::new(client, prompt, GatewayConfig::from_app(config));

        let pipeline = Self::from_parts(
            model,
            index,
            Chunker::from_settings(&config.rag)?,
            RetrieverConfig::from(&config.rag),
            gateway,
        );
        pipeline.index.ensure_collection().await?;

        tracing::info!(
            backend = pipeline.index.backend_name(),
            collection = %config.index.collection,
            dimension = config.rag.embedding_dimension,
            "Pipeline ready"
        );
        Ok(pipeline)
    }

    /// Assemble a pipeline from already built components.
    pub fn from_parts(
        model: Arc<ModelHandle>,
        index: Arc<dyn VectorIndex>,
        chunker: Chunker,
        retriever_config: RetrieverConfig,
        gateway: Gateway,
    ) -> Self {
        let embedder = Embedder::new(Arc::clone(&model));
        Self {
            ingestor: Ingestor::new(chunker, embedder.clone(), Arc::clone(&index)),
            retriever: Retriever::new(embedder, Arc::clone(&index), retriever_config),
            model,
            index,
            gateway,
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    /// Load the supported files under `paths` and ingest them.
    ///
    /// Files that cannot be read are reported as failures alongside the
    /// documents that fail later in the run.
    pub async fn ingest_paths(
        &self,
        paths: &[PathBuf],
        include: &[String],
        exclude: &[String],
    ) -> IngestReport {
        let loaded = load_documents(paths, include, exclude);
        let mut report = self.ingestor.ingest(&loaded.documents).await;
        report.failures.extend(loaded.failures);
        report
    }

    pub async fn ingest(&self, documents: &[Document]) -> IngestReport {
        self.ingestor.ingest(documents).await
    }

    /// Retrieve context for `query` without generating an answer.
    pub async fn search(&self, query: &Query) -> AppResult<RetrievalResult> {
        self.retriever.retrieve(query).await
    }

    /// Retrieve context and generate a cited answer.
    ///
    /// An empty collection, or a filter nothing matches, yields the
    /// no-information answer rather than an error.
    pub async fn ask(&self, query: &Query, history: &[ChatTurn]) -> AppResult<RagAnswer> {
        match self.retriever.retrieve(query).await {
            Ok(retrieval) => self.gateway.answer(&query.text, &retrieval, history).await,
            Err(AppError::NoResults) => Ok(RagAnswer::no_information(&query.text)),
            Err(e) => Err(e),
        }
    }

    pub async fn list(
        &self,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> AppResult<Vec<IndexedChunk>> {
        self.index.list(filter, limit).await
    }

    pub async fn delete_source(&self, source_id: &str) -> AppResult<usize> {
        let removed = self.index.delete_by_source(source_id).await?;
        tracing::info!(source_id, removed, "Deleted source");
        Ok(removed)
    }

    pub async fn delete_ids(&self, ids: &[String]) -> AppResult<usize> {
        let removed = self.index.delete_ids(ids).await?;
        tracing::info!(removed, "Deleted chunks");
        Ok(removed)
    }

    pub async fn stats(&self) -> AppResult<IndexStats> {
        self.index.stats().await
    }

    pub async fn reset(&self) -> AppResult<()> {
        self.index.reset().await?;
        tracing::info!(collection = %self.index.spec().name, "Collection cleared");
        Ok(())
    }
}
