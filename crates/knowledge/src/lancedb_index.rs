//! LanceDB-backed vector index implementation.

use crate::filter::{Filter, SqlColumns};
use crate::types::Metadata;
use crate::vector_index::{
    sort_hits, validate_batch, CollectionSpec, EmbeddingRecord, IndexStats, IndexedChunk,
    SearchHit, VectorIndex,
};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, ListArray, RecordBatch,
    RecordBatchIterator, StringArray, UInt32Array,
};
use arrow_buffer::OffsetBuffer;
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use ragline_core::{AppError, AppResult, SimilarityMetric};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Columns a filter may be pushed down to as SQL.
const PUSHDOWN_COLUMNS: SqlColumns<'static> = SqlColumns {
    scalar: &["id", "source_id", "position", "text"],
    lists: &["tags"],
};

/// Candidates fetched per requested hit when a filter must run client-side;
/// the window grows by this factor until enough hits match.
const CLIENT_FILTER_OVERFETCH: usize = 10;

/// LanceDB-backed vector index.
///
/// The table is opened (or created) lazily on first use. Scores are
/// recomputed from the stored vectors with the collection metric so both
/// backends rank identically.
pub struct LanceDbIndex {
    uri: String,
    spec: CollectionSpec,
    table: OnceCell<Table>,
}

impl LanceDbIndex {
    /// Index stored under `uri` (a local directory or a LanceDB URI).
    pub fn new(uri: impl Into<String>, spec: CollectionSpec) -> Self {
        Self {
            uri: uri.into(),
            spec,
            table: OnceCell::new(),
        }
    }

    fn schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("source_id", DataType::Utf8, false),
            Field::new("position", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
            Field::new(
                "tags",
                DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
                true,
            ),
            // Full metadata map as JSON
            Field::new("metadata", DataType::Utf8, false),
            // Microseconds since the epoch, offset per row for ordering within a batch
            Field::new("upserted_at", DataType::Int64, false),
        ]))
    }

    async fn connect(&self) -> AppResult<Connection> {
        if !self.uri.contains("://") {
            std::fs::create_dir_all(&self.uri).map_err(|e| {
                AppError::IndexUnavailable(format!("Failed to create index directory: {}", e))
            })?;
        }

        lancedb::connect(&self.uri)
            .execute()
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to connect to LanceDB: {}", e)))
    }

    async fn open_or_create(&self) -> AppResult<Table> {
        let conn = self.connect().await?;
        let table_names = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| AppError::IndexUnavailable(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.spec.name) {
            let table = conn
                .open_table(&self.spec.name)
                .execute()
                .await
                .map_err(|e| AppError::IndexUnavailable(format!("Failed to open table: {}", e)))?;
            self.check_dimension(&table).await?;
            tracing::debug!(collection = %self.spec.name, uri = %self.uri, "Opened LanceDB table");
            return Ok(table);
        }

        let schema = Self::schema(self.spec.dimension);
        let empty = RecordBatch::new_empty(schema.clone());
        let table = conn
            .create_table(
                &self.spec.name,
                RecordBatchIterator::new(vec![Ok(empty)], schema),
            )
            .execute()
            .await
            .map_err(|e| index_error("Failed to create table", e))?;

        tracing::info!(
            collection = %self.spec.name,
            dimension = self.spec.dimension,
            metric = self.spec.metric.as_str(),
            "Created LanceDB table"
        );
        Ok(table)
    }

    async fn check_dimension(&self, table: &Table) -> AppResult<()> {
        let schema = table
            .schema()
            .await
            .map_err(|e| index_error("Failed to read schema", e))?;

        let stored = match schema.field_with_name("vector").map(|f| f.data_type().clone()) {
            Ok(DataType::FixedSizeList(_, size)) => size as usize,
            _ => {
                return Err(AppError::Index(format!(
                    "Table '{}' has no vector column",
                    self.spec.name
                )))
            }
        };

        if stored != self.spec.dimension {
            return Err(AppError::DimensionMismatch {
                expected: stored,
                actual: self.spec.dimension,
            });
        }
        Ok(())
    }

    async fn table(&self) -> AppResult<&Table> {
        self.table.get_or_try_init(|| self.open_or_create()).await
    }

    fn records_to_batch(&self, records: &[EmbeddingRecord]) -> AppResult<RecordBatch> {
        let dimension = self.spec.dimension;
        let base = chrono::Utc::now().timestamp_micros();

        let ids = StringArray::from_iter_values(records.iter().map(|r| r.id.as_str()));
        let sources = StringArray::from_iter_values(records.iter().map(|r| r.source_id.as_str()));
        let positions = UInt32Array::from_iter_values(records.iter().map(|r| r.position));
        let texts = StringArray::from_iter_values(records.iter().map(|r| r.text.as_str()));

        let values = Float32Array::from_iter_values(
            records.iter().flat_map(|r| r.vector.iter().copied()),
        );
        let vectors = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            dimension as i32,
            Arc::new(values),
            None,
        )
        .map_err(|e| AppError::Index(format!("Failed to build vector column: {}", e)))?;

        // Tags are flattened into one values array with per-row offsets
        let tag_lists: Vec<Vec<&str>> = records.iter().map(|r| record_tags(&r.metadata)).collect();
        let tag_values =
            StringArray::from_iter_values(tag_lists.iter().flat_map(|tags| tags.iter().copied()));
        let tags = ListArray::try_new(
            Arc::new(Field::new("item", DataType::Utf8, true)),
            OffsetBuffer::from_lengths(tag_lists.iter().map(Vec::len)),
            Arc::new(tag_values),
            None,
        )
        .map_err(|e| AppError::Index(format!("Failed to build tags column: {}", e)))?;

        let metadata = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata))
            .collect::<Result<Vec<_>, _>>()?;
        let metadata = StringArray::from(metadata);

        let upserted_at =
            Int64Array::from_iter_values((0..records.len() as i64).map(|offset| base + offset));

        RecordBatch::try_new(
            Self::schema(dimension),
            vec![
                Arc::new(ids),
                Arc::new(sources),
                Arc::new(positions),
                Arc::new(texts),
                Arc::new(vectors),
                Arc::new(tags),
                Arc::new(metadata),
                Arc::new(upserted_at),
            ],
        )
        .map_err(|e| AppError::Index(format!("Failed to create RecordBatch: {}", e)))
    }

    /// Read every row of `batches` into records, with their upsert stamps.
    fn batches_to_records(batches: &[RecordBatch]) -> AppResult<Vec<(EmbeddingRecord, i64)>> {
        let mut out = Vec::new();
        for batch in batches {
            let ids = string_column(batch, "id")?;
            let sources = string_column(batch, "source_id")?;
            let texts = string_column(batch, "text")?;
            let metadata = string_column(batch, "metadata")?;
            let positions = column::<UInt32Array>(batch, "position")?;
            let stamps = column::<Int64Array>(batch, "upserted_at")?;
            let vectors = column::<FixedSizeListArray>(batch, "vector")?;

            for row in 0..batch.num_rows() {
                let values = vectors.value(row);
                let vector = values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| AppError::Index("Invalid vector values".to_string()))?
                    .values()
                    .to_vec();

                let metadata: Metadata = serde_json::from_str(metadata.value(row))?;
                out.push((
                    EmbeddingRecord {
                        id: ids.value(row).to_string(),
                        source_id: sources.value(row).to_string(),
                        position: positions.value(row),
                        text: texts.value(row).to_string(),
                        vector,
                        metadata,
                    },
                    stamps.value(row),
                ));
            }
        }
        Ok(out)
    }

    async fn scan(&self, sql: Option<&str>, limit: Option<usize>) -> AppResult<Vec<RecordBatch>> {
        let table = self.table().await?;
        let mut query = table.query();
        if let Some(sql) = sql {
            query = query.only_if(sql);
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        query
            .execute()
            .await
            .map_err(|e| index_error("Failed to execute scan", e))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| index_error("Failed to collect rows", e))
    }

    async fn nearest(
        &self,
        table: &Table,
        query: &[f32],
        limit: usize,
        sql: Option<&str>,
    ) -> AppResult<Vec<RecordBatch>> {
        let mut search = table
            .query()
            .nearest_to(query.to_vec())
            .map_err(|e| index_error("Failed to create query", e))?
            .distance_type(self.distance_type())
            .limit(limit);
        if let Some(sql) = sql {
            search = search.only_if(sql);
        }

        search
            .execute()
            .await
            .map_err(|e| index_error("Failed to execute search", e))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| index_error("Failed to collect results", e))
    }

    fn distance_type(&self) -> DistanceType {
        match self.spec.metric {
            SimilarityMetric::Cosine => DistanceType::Cosine,
            SimilarityMetric::InnerProduct => DistanceType::Dot,
        }
    }
}

fn record_tags(metadata: &Metadata) -> Vec<&str> {
    metadata
        .get("tags")
        .and_then(|v| v.as_array())
        .map(|tags| tags.iter().filter_map(|t| t.as_str()).collect())
        .unwrap_or_default()
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| AppError::Index(format!("Invalid {} column", name)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
    column::<StringArray>(batch, name)
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Map a LanceDB failure, keeping connectivity and storage I/O retryable.
fn index_error(context: &str, err: lancedb::Error) -> AppError {
    let message = format!("{}: {}", context, err);
    if is_unavailable(&err) {
        AppError::IndexUnavailable(message)
    } else {
        AppError::Index(message)
    }
}

fn is_unavailable(err: &lancedb::Error) -> bool {
    match err {
        lancedb::Error::ObjectStore { .. }
        | lancedb::Error::CreateDir { .. }
        | lancedb::Error::Timeout { .. } => true,
        lancedb::Error::InvalidInput { .. }
        | lancedb::Error::InvalidTableName { .. }
        | lancedb::Error::Schema { .. }
        | lancedb::Error::Arrow { .. }
        | lancedb::Error::NotSupported { .. } => false,
        other => caused_by_io(other),
    }
}

/// Whether an I/O error appears anywhere in the source chain.
fn caused_by_io(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut cause = err.source();
    while let Some(current) = cause {
        if current.downcast_ref::<std::io::Error>().is_some() {
            return true;
        }
        cause = current.source();
    }
    false
}

#[async_trait]
impl VectorIndex for LanceDbIndex {
    fn backend_name(&self) -> &str {
        "lancedb"
    }

    fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    async fn ensure_collection(&self) -> AppResult<()> {
        self.table().await.map(|_| ())
    }

    async fn upsert(&self, records: &[EmbeddingRecord]) -> AppResult<usize> {
        validate_batch(records, self.spec.dimension)?;
        if records.is_empty() {
            return Ok(0);
        }

        // merge_insert rejects duplicate keys within one batch; the last one wins
        let mut seen = HashSet::new();
        let mut unique: Vec<EmbeddingRecord> = records
            .iter()
            .rev()
            .filter(|r| seen.insert(r.id.as_str()))
            .cloned()
            .collect();
        unique.reverse();

        let batch = self.records_to_batch(&unique)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)], schema));

        let table = self.table().await?;
        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(reader)
            .await
            .map_err(|e| index_error("Failed to upsert records", e))?;

        tracing::debug!(count = unique.len(), "Upserted records into LanceDB");
        Ok(unique.len())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> AppResult<Vec<SearchHit>> {
        if query.len() != self.spec.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.spec.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let pushdown = filter.and_then(|f| f.to_sql(&PUSHDOWN_COLUMNS));
        let client_side = filter.filter(|_| pushdown.is_none());
        let table = self.table().await?;

        // A pushed-down filter is exact within one window of k. A client-side
        // filter widens the window until k records match or every row is scored.
        let (mut limit, total) = match client_side {
            Some(_) => {
                let total = table
                    .count_rows(None)
                    .await
                    .map_err(|e| index_error("Failed to count rows", e))?;
                (k.saturating_mul(CLIENT_FILTER_OVERFETCH), total)
            }
            None => (k, k),
        };

        let mut scored = loop {
            let batches = self
                .nearest(table, query, limit, pushdown.as_deref())
                .await?;
            let scored: Vec<(SearchHit, i64)> = Self::batches_to_records(&batches)?
                .into_iter()
                .filter(|(record, _)| client_side.map_or(true, |f| f.matches(record)))
                .map(|(record, stamp)| {
                    let hit = SearchHit {
                        score: self.spec.metric.score(query, &record.vector),
                        id: record.id,
                        source_id: record.source_id,
                        position: record.position,
                        text: record.text,
                        metadata: record.metadata,
                    };
                    (hit, stamp)
                })
                .collect();

            if scored.len() >= k || limit >= total {
                break scored;
            }
            limit = limit.saturating_mul(CLIENT_FILTER_OVERFETCH).min(total);
            tracing::debug!(limit, matched = scored.len(), "Widening filtered LanceDB search");
        };

        sort_hits(&mut scored);
        scored.truncate(k);

        tracing::debug!(
            hits = scored.len(),
            k,
            pushdown = pushdown.is_some(),
            "LanceDB search complete"
        );
        Ok(scored.into_iter().map(|(hit, _)| hit).collect())
    }

    async fn delete_by_source(&self, source_id: &str) -> AppResult<usize> {
        let predicate = format!("source_id = {}", quote(source_id));
        let table = self.table().await?;
        let count = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| index_error("Failed to count rows", e))?;
        if count > 0 {
            table
                .delete(&predicate)
                .await
                .map_err(|e| index_error("Failed to delete source", e))?;
        }
        Ok(count)
    }

    async fn delete_ids(&self, ids: &[String]) -> AppResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let list: Vec<String> = ids.iter().map(|id| quote(id)).collect();
        let predicate = format!("id IN ({})", list.join(", "));

        let table = self.table().await?;
        let count = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| index_error("Failed to count rows", e))?;
        if count > 0 {
            table
                .delete(&predicate)
                .await
                .map_err(|e| index_error("Failed to delete ids", e))?;
        }
        Ok(count)
    }

    async fn list(
        &self,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> AppResult<Vec<IndexedChunk>> {
        let pushdown = filter.and_then(|f| f.to_sql(&PUSHDOWN_COLUMNS));
        let client_side = filter.filter(|_| pushdown.is_none());

        let batches = self.scan(pushdown.as_deref(), None).await?;
        let mut chunks: Vec<IndexedChunk> = Self::batches_to_records(&batches)?
            .into_iter()
            .map(|(record, _)| record)
            .filter(|record| client_side.map_or(true, |f| f.matches(record)))
            .map(IndexedChunk::from)
            .collect();

        chunks.sort_by(|a, b| {
            a.source_id
                .cmp(&b.source_id)
                .then(a.position.cmp(&b.position))
        });
        if let Some(limit) = limit {
            chunks.truncate(limit);
        }
        Ok(chunks)
    }

    async fn count(&self) -> AppResult<usize> {
        self.table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| index_error("Failed to count rows", e))
    }

    async fn stats(&self) -> AppResult<IndexStats> {
        let records = self.count().await?;

        let table = self.table().await?;
        let batches = table
            .query()
            .select(lancedb::query::Select::columns(&["source_id"]))
            .execute()
            .await
            .map_err(|e| index_error("Failed to scan sources", e))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| index_error("Failed to collect sources", e))?;

        let mut sources = HashSet::new();
        for batch in &batches {
            let column = string_column(batch, "source_id")?;
            for row in 0..column.len() {
                sources.insert(column.value(row).to_string());
            }
        }

        Ok(IndexStats {
            backend: self.backend_name().to_string(),
            collection: self.spec.name.clone(),
            dimension: self.spec.dimension,
            metric: self.spec.metric,
            records,
            sources: sources.len(),
        })
    }

    async fn reset(&self) -> AppResult<()> {
        let table = self.table().await?;
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| index_error("Failed to count rows", e))?;
        table
            .delete("id IS NOT NULL")
            .await
            .map_err(|e| index_error("Failed to reset index", e))?;

        tracing::info!(collection = %self.spec.name, removed = count, "Reset LanceDB index");
        Ok(())
    }
}
