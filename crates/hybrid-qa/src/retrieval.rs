//! Document retrieval: ingestion into the vector index and context-grounded answers.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

use crate::config::ChunkingConfig;
use crate::embeddings::EmbeddingModel;
use crate::error::{QaError, Result};
use crate::llm::{GenerationConfig, LLMProvider};
use crate::processing::{load_directory, SourceDocument, TextChunker};
use crate::storage::{ChunkRecord, LanceStore};
use crate::templates::render;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    pub score: f32,
}

/// Top-k similarity lookup over the ingested corpus.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>>;

    /// Open backing resources ahead of the first query.
    async fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}

/// Retriever over the persisted LanceDB index, opened on first use.
pub struct LanceRetriever {
    index_dir: PathBuf,
    embeddings: Arc<dyn EmbeddingModel>,
    store: OnceCell<LanceStore>,
}

impl LanceRetriever {
    pub fn new(index_dir: impl Into<PathBuf>, embeddings: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            index_dir: index_dir.into(),
            embeddings,
            store: OnceCell::new(),
        }
    }

    /// Open the index once; concurrent first callers wait on the same open.
    pub async fn store(&self) -> Result<&LanceStore> {
        self.store
            .get_or_try_init(|| async {
                tracing::info!(path = %self.index_dir.display(), "Opening vector index");
                LanceStore::new(&self.index_dir.display().to_string(), self.embeddings.dimension()).await
            })
            .await
    }
}

#[async_trait]
impl Retriever for LanceRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let store = self.store().await?;
        let vector = self.embeddings.embed_query(query).await?;
        let hits = store.vector_search(&vector, k).await?;
        Ok(hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                text: hit.text,
                source: hit.source,
                score: hit.score,
            })
            .collect())
    }

    async fn warm_up(&self) -> Result<()> {
        self.store().await.map(|_| ())
    }
}

/// Chunk texts in rank order, separated by blank lines.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Answers strictly from retrieved context.
pub struct RetrievalAnswerer {
    llm: Arc<dyn LLMProvider>,
    retriever: Arc<dyn Retriever>,
    template: String,
    generation: GenerationConfig,
    k: usize,
}

impl RetrievalAnswerer {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        retriever: Arc<dyn Retriever>,
        template: String,
        generation: &GenerationConfig,
        k: usize,
    ) -> Self {
        Self {
            llm,
            retriever,
            template,
            generation: generation.clone(),
            k: k.max(1),
        }
    }

    pub async fn answer_unstructured(&self, question: &str) -> Result<String> {
        let start = Instant::now();
        let chunks = self.retriever.retrieve(question, self.k).await?;
        tracing::debug!(
            chunks = chunks.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Retrieved context"
        );

        let context = build_context(&chunks);
        let prompt = render(&self.template, &[("context", context.as_str()), ("question", question)]);
        let answer = self.llm.generate(&prompt, &self.generation).await?;
        Ok(answer.trim().to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub failed: Vec<String>,
}

/// Offline pipeline: load, chunk, embed and persist a document directory.
pub struct Ingestor {
    store: LanceStore,
    embeddings: Arc<dyn EmbeddingModel>,
    chunker: TextChunker,
}

impl Ingestor {
    pub fn new(store: LanceStore, embeddings: Arc<dyn EmbeddingModel>, chunker: TextChunker) -> Self {
        Self {
            store,
            embeddings,
            chunker,
        }
    }

    pub async fn open(
        index_dir: &Path,
        embeddings: Arc<dyn EmbeddingModel>,
        chunking: &ChunkingConfig,
    ) -> Result<Self> {
        let store = LanceStore::new(&index_dir.display().to_string(), embeddings.dimension()).await?;
        Ok(Self::new(store, embeddings, TextChunker::from_config(chunking)))
    }

    pub fn store(&self) -> &LanceStore {
        &self.store
    }

    pub async fn ingest_directory(&self, data_dir: &Path) -> Result<IngestReport> {
        let start = Instant::now();
        let dir = data_dir.to_path_buf();
        let corpus = tokio::task::spawn_blocking(move || load_directory(&dir))
            .await
            .map_err(|e| QaError::Ingestion(format!("Document loading task failed: {}", e)))?;

        let mut report = IngestReport {
            documents: corpus.documents.len(),
            chunks: 0,
            failed: corpus.failed,
        };

        if corpus.documents.is_empty() {
            tracing::info!(path = %data_dir.display(), "No documents found to ingest");
            return Ok(report);
        }

        for (source, documents) in group_by_source(corpus.documents) {
            // Old chunks stay in place until the new ones are embedded.
            let records = self.embed_source(&source, &documents).await?;
            let stored = records.len();
            let replaced = self.store.delete_by_source(&source).await?;
            if !records.is_empty() {
                self.store.insert_chunks(records).await?;
            }
            tracing::debug!(source = %source, replaced = replaced, chunks = stored, "Ingested source");
            report.chunks += stored;
        }

        tracing::info!(
            documents = report.documents,
            chunks = report.chunks,
            failed = report.failed.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Ingestion complete"
        );
        Ok(report)
    }

    async fn embed_source(&self, source: &str, documents: &[SourceDocument]) -> Result<Vec<ChunkRecord>> {
        let chunks: Vec<String> = documents
            .iter()
            .flat_map(|doc| self.chunker.chunk(&doc.text))
            .map(|c| c.text)
            .collect();
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let vectors = self.embeddings.embed_documents(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(QaError::Ingestion(format!(
                "Embedded {} of {} chunks from {}",
                vectors.len(),
                chunks.len(),
                source
            )));
        }

        let now = chrono::Utc::now().timestamp();
        Ok(chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, vector))| ChunkRecord {
                id: uuid::Uuid::new_v4().to_string(),
                source: source.to_string(),
                chunk_index: i as u32,
                text,
                vector,
                created_at: now,
            })
            .collect())
    }
}

/// Group documents by source file, keeping first-seen order.
fn group_by_source(documents: Vec<SourceDocument>) -> Vec<(String, Vec<SourceDocument>)> {
    let mut groups: Vec<(String, Vec<SourceDocument>)> = Vec::new();
    for doc in documents {
        match groups.iter_mut().find(|(source, _)| *source == doc.source) {
            Some((_, docs)) => docs.push(doc),
            None => groups.push((doc.source.clone(), vec![doc])),
        }
    }
    groups
}
