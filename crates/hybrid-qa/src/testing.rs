//! Test doubles shared by the in-module tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::embeddings::EmbeddingModel;
use crate::error::Result;
use crate::llm::{GenerationConfig, LLMProvider, ProviderInfo};
use crate::retrieval::{RetrievedChunk, Retriever};

type Responder = dyn Fn(&str) -> Result<String> + Send + Sync;

/// LLM stand-in that answers every prompt through a closure and records the prompts.
#[derive(Clone)]
pub struct ScriptedProvider {
    responder: Arc<Responder>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProvider {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        (self.responder)(prompt)
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "scripted".into(),
            model: "scripted".into(),
            endpoint: "memory".into(),
        }
    }
}

/// Retriever over a fixed list of chunks, ranked by shared lowercase words.
pub struct StaticRetriever {
    chunks: Vec<String>,
}

impl StaticRetriever {
    pub fn new(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 2)
            .collect();

        let mut scored: Vec<(usize, &String)> = self
            .chunks
            .iter()
            .map(|chunk| {
                let lower = chunk.to_lowercase();
                (words.iter().filter(|w| lower.contains(w.as_str())).count(), chunk)
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, text)| RetrievedChunk {
                text: text.clone(),
                source: "memory".into(),
                score: score as f32,
            })
            .collect())
    }
}

/// Deterministic bag-of-words embeddings: each word lands in a hashed bucket.
pub struct HashEmbeddings {
    dimension: usize,
}

impl HashEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if word.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() % self.dimension as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingModel for HashEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
