//! Embeddings served by an OpenAI-compatible `/embeddings` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::EmbeddingModel;
use crate::config::{EmbeddingSettings, LlmSettings};
use crate::error::{QaError, Result};
use crate::llm::external::{build_http_client, post_json};

pub struct ExternalEmbeddings {
    api_key: String,
    endpoint: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    client: Client,
}

impl ExternalEmbeddings {
    pub fn new(llm: &LlmSettings, settings: &EmbeddingSettings) -> Result<Self> {
        Ok(Self {
            api_key: llm.api_key.clone(),
            endpoint: format!("{}/embeddings", llm.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            dimension: settings.dimension,
            batch_size: settings.batch_size.max(1),
            client: build_http_client()?,
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = json!({
            "model": self.model,
            "input": texts,
        });
        let response: EmbeddingResponse =
            post_json(&self.client, &self.endpoint, &self.api_key, &request).await?;
        let vectors = order_embeddings(response, texts.len())?;

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(QaError::ExternalCall(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                bad.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingModel for ExternalEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| QaError::ExternalCall("Embedding endpoint returned no vectors".into()))
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Put vectors back in input order; the API reports an `index` per item.
fn order_embeddings(mut response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    if response.data.len() != expected {
        return Err(QaError::ExternalCall(format!(
            "Embedding endpoint returned {} vectors for {} inputs",
            response.data.len(),
            expected
        )));
    }
    response.data.sort_by_key(|item| item.index);
    Ok(response.data.into_iter().map(|item| item.embedding).collect())
}
