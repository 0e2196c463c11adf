//! Load, chunk and embed the documents under DATA_DIR into the vector index.

use anyhow::{Context, Result};
use std::sync::Arc;

use hybrid_qa::{EmbeddingModel, ExternalEmbeddings, Ingestor};
use hybrid_qa_server::{init_tracing, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = load_config()?;

    let embeddings: Arc<dyn EmbeddingModel> = Arc::new(ExternalEmbeddings::new(&config.llm, &config.embedding)?);
    let ingestor = Ingestor::open(&config.index_dir, embeddings, &config.chunking)
        .await
        .context("Failed to open vector index")?;

    let report = ingestor.ingest_directory(&config.data_dir).await?;
    if report.documents == 0 {
        println!("No documents found under '{}'.", config.data_dir.display());
    } else {
        println!(
            "Ingestion completed. Stored {} chunks from {} documents in '{}'.",
            report.chunks,
            report.documents,
            config.index_dir.display()
        );
    }
    for failed in &report.failed {
        println!("Skipped (failed to load): {}", failed);
    }
    Ok(())
}
