//! Document ingestion.
//!
//! Turns documents into embedding records: chunk, embed, upsert, then drop
//! the records an earlier version of the same source left behind.

use crate::chunk::{Chunk, Chunker};
use crate::embeddings::Embedder;
use crate::filter::Filter;
use crate::parser::{self, ContentType};
use crate::types::Document;
use crate::vector_index::{EmbeddingRecord, VectorIndex};
use ragline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

/// A document that could not be ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestFailure {
    pub source_id: String,
    pub error: String,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub run_id: String,
    pub documents_ingested: usize,
    pub chunks_written: usize,
    /// Chunks whose text was truncated before embedding
    pub truncated_texts: usize,
    /// Records of earlier versions that were removed
    pub stale_removed: usize,
    pub failures: Vec<IngestFailure>,
    pub duration_secs: f64,
}

impl IngestReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// What one document contributed to a run.
struct DocumentOutcome {
    chunks: usize,
    truncated: usize,
    stale: usize,
}

/// Writes documents into a vector index.
#[derive(Clone)]
pub struct Ingestor {
    chunker: Chunker,
    embedder: Embedder,
    index: Arc<dyn VectorIndex>,
}

impl Ingestor {
    pub fn new(chunker: Chunker, embedder: Embedder, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            chunker,
            embedder,
            index,
        }
    }

    /// Ingest `documents` one after another.
    ///
    /// A failure while chunking, embedding or writing one document is
    /// recorded in the report and the run moves on to the next document.
    pub async fn ingest(&self, documents: &[Document]) -> IngestReport {
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, documents = documents.len(), "Starting ingestion");

        let mut report = IngestReport {
            run_id,
            documents_ingested: 0,
            chunks_written: 0,
            truncated_texts: 0,
            stale_removed: 0,
            failures: Vec::new(),
            duration_secs: 0.0,
        };

        for document in documents {
            match self.ingest_document(document).await {
                Ok(outcome) => {
                    report.documents_ingested += 1;
                    report.chunks_written += outcome.chunks;
                    report.truncated_texts += outcome.truncated;
                    report.stale_removed += outcome.stale;
                }
                Err(e) => {
                    tracing::warn!(source_id = %document.source_id, error = %e, "Failed to ingest document");
                    report.failures.push(IngestFailure {
                        source_id: document.source_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report.duration_secs = start.elapsed().as_secs_f64();
        tracing::info!(
            run_id = %report.run_id,
            documents = report.documents_ingested,
            chunks = report.chunks_written,
            failures = report.failures.len(),
            "Ingestion completed in {:.2}s",
            report.duration_secs
        );
        report
    }

    async fn ingest_document(&self, document: &Document) -> AppResult<DocumentOutcome> {
        tracing::debug!(source_id = %document.source_id, "Ingesting document");

        let source_filter = Filter::eq("source_id", document.source_id.as_str());
        let previous: HashSet<String> = self
            .index
            .list(Some(&source_filter), None)
            .await?
            .into_iter()
            .map(|chunk| chunk.id)
            .collect();

        let chunks: Vec<Chunk> = self.chunker.chunks(document).collect();
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        let records: Vec<EmbeddingRecord> = chunks
            .into_iter()
            .zip(embeddings.vectors)
            .map(|(chunk, vector)| EmbeddingRecord::from_chunk(chunk, vector))
            .collect();

        if !records.is_empty() {
            self.index.upsert(&records).await?;
        }

        // Only after the new version is in place
        let current: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let stale: Vec<String> = previous
            .into_iter()
            .filter(|id| !current.contains(id.as_str()))
            .collect();
        let stale_removed = if stale.is_empty() {
            0
        } else {
            self.index.delete_ids(&stale).await?
        };

        tracing::debug!(
            source_id = %document.source_id,
            chunks = records.len(),
            stale_removed,
            "Document ingested"
        );

        Ok(DocumentOutcome {
            chunks: records.len(),
            truncated: embeddings.truncated.len(),
            stale: stale_removed,
        })
    }
}

/// Documents read from disk, plus the files that could not be read.
#[derive(Debug, Default)]
pub struct LoadedDocuments {
    pub documents: Vec<Document>,
    pub failures: Vec<IngestFailure>,
}

/// Read the supported files under `paths`.
///
/// Directories are walked recursively; files with unsupported extensions
/// inside them are skipped. A path whose string contains any `exclude`
/// pattern is skipped, and when `include` is non-empty a path must contain
/// one of its patterns.
pub fn load_documents(paths: &[PathBuf], include: &[String], exclude: &[String]) -> LoadedDocuments {
    let mut loaded = LoadedDocuments::default();

    for path in paths {
        if path.is_file() {
            load_one(path, &mut loaded);
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let entry_path = entry.path();
                if !entry_path.is_file() || ContentType::from_path(entry_path).is_none() {
                    continue;
                }
                if should_include(entry_path, include, exclude) {
                    load_one(entry_path, &mut loaded);
                }
            }
        } else {
            loaded.failures.push(IngestFailure {
                source_id: path.to_string_lossy().to_string(),
                error: AppError::Other(format!("Path not found: {:?}", path)).to_string(),
            });
        }
    }

    tracing::debug!(
        documents = loaded.documents.len(),
        failures = loaded.failures.len(),
        "Loaded documents"
    );
    loaded
}

fn load_one(path: &Path, loaded: &mut LoadedDocuments) {
    match parser::parse_file(path) {
        Ok(document) => loaded.documents.push(document),
        Err(e) => {
            tracing::warn!("Skipping {:?}: {}", path, e);
            loaded.failures.push(IngestFailure {
                source_id: path.to_string_lossy().to_string(),
                error: e.to_string(),
            });
        }
    }
}

fn should_include(path: &Path, include: &[String], exclude: &[String]) -> bool {
    let path_str = path.to_string_lossy();

    if exclude.iter().any(|pattern| path_str.contains(pattern.as_str())) {
        return false;
    }

    include.is_empty() || include.iter().any(|pattern| path_str.contains(pattern.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_should_include_patterns() {
        let path = Path::new("docs/guide/intro.md");
        assert!(should_include(path, &[], &[]));
        assert!(should_include(path, &["guide".to_string()], &[]));
        assert!(!should_include(path, &["api".to_string()], &[]));
        assert!(!should_include(path, &[], &["intro".to_string()]));
        assert!(!should_include(
            path,
            &["guide".to_string()],
            &["intro".to_string()]
        ));
    }

    #[test]
    fn test_load_documents_walks_and_filters() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "# Alpha\n\nFirst file.").unwrap();
        fs::write(dir.path().join("b.txt"), "Second file.").unwrap();
        fs::write(dir.path().join("c.rs"), "fn main() {}").unwrap();
        fs::create_dir(dir.path().join("drafts")).unwrap();
        fs::write(dir.path().join("drafts/d.md"), "Draft.").unwrap();

        let loaded = load_documents(&[dir.path().to_path_buf()], &[], &["drafts".to_string()]);
        assert!(loaded.failures.is_empty());
        assert_eq!(loaded.documents.len(), 2);
        assert_eq!(loaded.documents[0].metadata.title.as_deref(), Some("Alpha"));
        assert_eq!(loaded.documents[1].content_type, ContentType::PlainText);
    }

    #[test]
    fn test_load_documents_reports_bad_paths() {
        let dir = TempDir::new().unwrap();
        let unsupported = dir.path().join("data.bin");
        fs::write(&unsupported, "x").unwrap();

        let loaded = load_documents(&[unsupported, dir.path().join("missing.md")], &[], &[]);
        assert!(loaded.documents.is_empty());
        assert_eq!(loaded.failures.len(), 2);
    }
}
