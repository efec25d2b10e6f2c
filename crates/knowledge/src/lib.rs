//! Retrieval-augmented generation over local documents.
//!
//! Documents are chunked, embedded and stored in a vector index; queries
//! retrieve ranked, budgeted context that is handed to an LLM together with
//! citation markers. [`RagPipeline`] wires the pieces from an
//! [`AppConfig`](ragline_core::AppConfig).

pub mod chunk;
pub mod embeddings;
pub mod filter;
pub mod ingest;
pub mod lancedb_index;
pub mod memory_index;
pub mod parser;
pub mod pipeline;
pub mod rag;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

pub use chunk::{chunk, Chunk, Chunker, Chunks};
pub use embeddings::{Embedder, EmbeddingConfig, EmbeddingProvider, Embeddings, ModelHandle};
pub use filter::{Filter, FilterOp};
pub use ingest::{load_documents, IngestFailure, IngestReport, Ingestor, LoadedDocuments};
pub use lancedb_index::LanceDbIndex;
pub use memory_index::MemoryIndex;
pub use parser::ContentType;
pub use pipeline::RagPipeline;
pub use rag::{
    Citation, Gateway, GatewayConfig, Query, RagAnswer, RetrievalResult, Retriever,
    RetrieverConfig, Stage, StageTiming,
};
pub use types::{Document, DocumentMetadata, Metadata};
pub use vector_index::{
    CollectionSpec, EmbeddingRecord, IndexStats, IndexedChunk, RetryingIndex, SearchHit,
    VectorIndex,
};
