//! Collection management: list, delete, stats, clear.

use super::{parse_filter, preview, print_json};
use clap::{ArgGroup, Args};
use ragline_core::AppResult;
use ragline_knowledge::RagPipeline;

/// List indexed chunks
#[derive(Args, Debug)]
pub struct ListCommand {
    /// Metadata filter
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Maximum number of chunks to show
    #[arg(short, long, default_value = "50")]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListCommand {
    pub async fn execute(&self, pipeline: &RagPipeline) -> AppResult<()> {
        tracing::info!("Executing list command");

        let filter = parse_filter(self.filter.as_deref())?;
        let chunks = pipeline.list(filter.as_ref(), Some(self.limit)).await?;

        if self.json {
            return print_json(&chunks);
        }

        if chunks.is_empty() {
            println!("No chunks stored.");
            return Ok(());
        }
        for chunk in &chunks {
            println!("[{}] {} #{}", chunk.id, chunk.source_id, chunk.position);
            println!("   {}", preview(&chunk.text, 100));
        }
        Ok(())
    }
}

/// Delete a source or individual chunks
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["source", "id"])))]
pub struct DeleteCommand {
    /// Remove every chunk of this source
    #[arg(long)]
    pub source: Option<String>,

    /// Remove chunks by id
    #[arg(long, num_args = 1..)]
    pub id: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl DeleteCommand {
    pub async fn execute(&self, pipeline: &RagPipeline) -> AppResult<()> {
        tracing::info!("Executing delete command");

        let removed = match self.source {
            Some(ref source) => pipeline.delete_source(source).await?,
            None => pipeline.delete_ids(&self.id).await?,
        };

        if self.json {
            return print_json(&serde_json::json!({ "removed": removed }));
        }
        println!("Removed {} chunk(s)", removed);
        Ok(())
    }
}

/// Show collection statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, pipeline: &RagPipeline) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let stats = pipeline.stats().await?;

        if self.json {
            return print_json(&stats);
        }

        println!("Collection: {}", stats.collection);
        println!("  Backend: {}", stats.backend);
        println!("  Dimension: {}", stats.dimension);
        println!("  Metric: {}", stats.metric.as_str());
        println!("  Sources: {}", stats.sources);
        println!("  Chunks: {}", stats.records);
        let model = pipeline.model().config();
        println!("  Embedding model: {} ({})", model.model, model.provider);
        Ok(())
    }
}

/// Remove every chunk from the collection
#[derive(Args, Debug)]
pub struct ClearCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ClearCommand {
    pub async fn execute(&self, pipeline: &RagPipeline) -> AppResult<()> {
        tracing::info!("Executing clear command");

        let before = pipeline.stats().await?.records;
        pipeline.reset().await?;

        if self.json {
            return print_json(&serde_json::json!({ "removed": before }));
        }
        println!("Cleared {} chunk(s)", before);
        Ok(())
    }
}
