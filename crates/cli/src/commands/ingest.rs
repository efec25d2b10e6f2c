//! Ingest command handler.

use super::print_json;
use clap::Args;
use ragline_core::AppResult;
use ragline_knowledge::RagPipeline;
use std::path::PathBuf;

/// Chunk, embed and index documents
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Files or directories to ingest (.md, .markdown, .html, .htm, .txt)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Only ingest paths containing one of these substrings
    #[arg(long)]
    pub include: Vec<String>,

    /// Skip paths containing any of these substrings
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Clear the collection before ingesting
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, pipeline: &RagPipeline) -> AppResult<()> {
        tracing::info!("Executing ingest command for {} path(s)", self.paths.len());

        if self.reset {
            pipeline.reset().await?;
        }

        let report = pipeline
            .ingest_paths(&self.paths, &self.include, &self.exclude)
            .await;

        if self.json {
            return print_json(&report);
        }

        println!(
            "Ingested {} document(s) ({} chunks) in {:.2}s",
            report.documents_ingested, report.chunks_written, report.duration_secs
        );
        if report.stale_removed > 0 {
            println!("  Removed {} outdated chunk(s)", report.stale_removed);
        }
        if report.truncated_texts > 0 {
            println!(
                "  {} chunk(s) were truncated before embedding",
                report.truncated_texts
            );
        }
        if !report.failures.is_empty() {
            println!("  {} failure(s):", report.failures.len());
            for failure in &report.failures {
                println!("  - {}: {}", failure.source_id, failure.error);
            }
        }

        Ok(())
    }
}
