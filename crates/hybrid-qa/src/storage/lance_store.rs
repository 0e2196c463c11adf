use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use lancedb::query::{ExecutableQuery, QueryBase};
use std::fmt::Display;
use std::sync::Arc;

use crate::error::{QaError, Result};

const TABLE_NAME: &str = "chunks";
const SEED_ID: &str = "__seed__";

/// One embedded chunk as persisted in the vector index.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub source: String,
    pub chunk_index: u32,
    pub text: String,
    pub vector: Vec<f32>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub source: String,
    pub chunk_index: u32,
    pub text: String,
    pub score: f32,
}

trait IndexContext<T> {
    fn index_context(self, what: &str) -> Result<T>;
}

impl<T, E: Display> IndexContext<T> for std::result::Result<T, E> {
    fn index_context(self, what: &str) -> Result<T> {
        self.map_err(|e| QaError::Index(format!("{}: {}", what, e)))
    }
}

pub struct LanceStore {
    db: lancedb::Connection,
    dimension: usize,
    table_name: String,
}

impl LanceStore {
    /// Open (or create) the on-disk index at `path`.
    pub async fn new(path: &str, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(path).ok();
        let db = lancedb::connect(path)
            .execute()
            .await
            .index_context("Failed to connect to LanceDB")?;

        let store = Self {
            db,
            dimension,
            table_name: TABLE_NAME.to_string(),
        };

        store.ensure_table().await?;
        Ok(store)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                true,
            ),
            Field::new("created_at", DataType::Int64, false),
        ]))
    }

    fn to_batch(&self, chunks: &[ChunkRecord]) -> Result<RecordBatch> {
        let flat_vectors: Vec<f32> = chunks.iter().flat_map(|c| c.vector.iter().copied()).collect();
        let values = Float32Array::from(flat_vectors);
        let vector_array = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .index_context("Vector length does not match index dimension")?;

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.id.as_str()))) as Arc<dyn Array>,
                Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.source.as_str()))),
                Arc::new(UInt32Array::from_iter_values(chunks.iter().map(|c| c.chunk_index))),
                Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.text.as_str()))),
                Arc::new(vector_array) as Arc<dyn Array>,
                Arc::new(Int64Array::from_iter_values(chunks.iter().map(|c| c.created_at))),
            ],
        )
        .index_context("Failed to create RecordBatch")
    }

    async fn ensure_table(&self) -> Result<()> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .index_context("Failed to list tables")?;
        if !names.contains(&self.table_name) {
            // Create from a seed record so the vector column gets its dimension, then drop it
            let seed = ChunkRecord {
                id: SEED_ID.to_string(),
                source: String::new(),
                chunk_index: 0,
                text: String::new(),
                vector: vec![0.0; self.dimension],
                created_at: 0,
            };
            let batch = self.to_batch(&[seed])?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], self.schema());
            self.db
                .create_table(&self.table_name, Box::new(batches))
                .execute()
                .await
                .index_context("Failed to create chunks table")?;

            let table = self.open().await?;
            table.delete(&format!("id = '{}'", SEED_ID)).await.ok();
        }
        Ok(())
    }

    async fn open(&self) -> Result<lancedb::Table> {
        self.db
            .open_table(&self.table_name)
            .execute()
            .await
            .index_context("Failed to open chunks table")
    }

    pub async fn insert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let table = self.open().await?;
        let batch = self.to_batch(&chunks)?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)], self.schema());
        table
            .add(Box::new(reader))
            .execute()
            .await
            .index_context("Failed to insert chunks")?;

        tracing::debug!("Inserted {} chunks into LanceDB", chunks.len());
        Ok(())
    }

    /// Nearest chunks by cosine distance; score is `1 - distance`.
    pub async fn vector_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let table = self.open().await?;

        let results = table
            .query()
            .nearest_to(query)
            .index_context("Invalid query vector")?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .index_context("LanceDB vector search failed")?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results)
            .await
            .index_context("Failed to read search results")?;
        Ok(extract_hits_from_batches(&batches))
    }

    pub async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let table = self.open().await?;
        let count_before = table.count_rows(None).await.unwrap_or(0);
        let predicate = format!("source = '{}'", source.replace('\'', "''"));
        table
            .delete(&predicate)
            .await
            .index_context("Failed to delete chunks")?;
        let count_after = table.count_rows(None).await.unwrap_or(0);
        Ok(count_before.saturating_sub(count_after))
    }

    pub async fn clear(&self) -> Result<()> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .index_context("Failed to list tables")?;
        if names.contains(&self.table_name) {
            self.db
                .drop_table(&self.table_name, &[])
                .await
                .index_context("Failed to drop chunks table")?;
        }
        self.ensure_table().await
    }

    pub async fn count(&self) -> Result<usize> {
        let table = self.open().await?;
        table.count_rows(None).await.index_context("Failed to count chunks")
    }
}

fn extract_hits_from_batches(batches: &[RecordBatch]) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    for batch in batches {
        let ids = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let texts = batch.column_by_name("text").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let sources = batch.column_by_name("source").and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let chunk_indices = batch.column_by_name("chunk_index").and_then(|c| c.as_any().downcast_ref::<UInt32Array>());
        let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let (Some(ids), Some(texts), Some(sources)) = (ids, texts, sources) else {
            continue;
        };

        for i in 0..batch.num_rows() {
            if ids.value(i) == SEED_ID {
                continue;
            }
            let score = distances.map(|d| (1.0 - d.value(i)).max(0.0)).unwrap_or(0.0);
            hits.push(SearchHit {
                id: ids.value(i).to_string(),
                source: sources.value(i).to_string(),
                chunk_index: chunk_indices.map(|c| c.value(i)).unwrap_or(0),
                text: texts.value(i).to_string(),
                score,
            });
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, source: &str, text: &str, vector: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            id: id.into(),
            source: source.into(),
            chunk_index: 0,
            text: text.into(),
            vector,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn test_insert_search_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceStore::new(dir.path().to_str().unwrap(), 3).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        store
            .insert_chunks(vec![
                record("a", "spa.md", "The spa opens at 9am.", vec![1.0, 0.0, 0.0]),
                record("b", "pool.md", "The pool is heated.", vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let hits = store.vector_search(&[0.9, 0.1, 0.0], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "spa.md");
        assert!(hits[0].score > 0.9);

        assert_eq!(store.delete_by_source("spa.md").await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LanceStore::new(dir.path().to_str().unwrap(), 3).await.unwrap();
        let err = store
            .insert_chunks(vec![record("a", "x", "t", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, QaError::Index(_)));
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap().to_string();
        {
            let store = LanceStore::new(&path, 2).await.unwrap();
            store
                .insert_chunks(vec![record("a", "x", "kept", vec![1.0, 0.0])])
                .await
                .unwrap();
        }
        let reopened = LanceStore::new(&path, 2).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        reopened.clear().await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 0);
    }
}
