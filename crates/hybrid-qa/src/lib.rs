pub mod config;
pub mod embeddings;
pub mod error;
pub mod eval;
pub mod llm;
pub mod orchestrator;
pub mod processing;
pub mod retrieval;
pub mod router;
pub mod sql;
pub mod storage;
pub mod templates;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience
pub use config::QaConfig;
pub use error::{QaError, Result};
pub use orchestrator::{HybridQa, PipelineOptions};
pub use retrieval::{IngestReport, Ingestor, LanceRetriever, RetrievalAnswerer, Retriever};
pub use sql::{LoadReport, QueryPolicy, SqlStore, StructuredAnswerer};
pub use templates::PromptTemplates;
pub use types::{FinalAnswer, Route, StructuredAnswer};

// Re-export LLM types
pub use embeddings::{EmbeddingModel, ExternalEmbeddings};
pub use llm::{ExternalProvider, GenerationConfig, LLMProvider, ProviderInfo};
