pub mod external;

use async_trait::async_trait;

use crate::error::Result;

pub use external::ExternalEmbeddings;

/// Unified embedding model trait
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed a search query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch embed documents for ingestion
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embedding vector dimension
    fn dimension(&self) -> usize;
}
