//! Dense-vector embedding provider (C5).

use crate::config::Config;
use crate::error::{BookGeneratorError, Result};
use async_trait::async_trait;
use ollama_rs::generation::embeddings::request::GenerateEmbeddingsRequest;
use ollama_rs::generation::embeddings::GenerateEmbeddingsResponse;
use ollama_rs::Ollama;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .pop()
            .ok_or_else(|| BookGeneratorError::EmbeddingError("empty embedding response".to_string()))
    }
    async fn test_connection(&self) -> Result<bool>;
}

pub struct OllamaEmbeddingProvider {
    client: Ollama,
    model: String,
}

impl OllamaEmbeddingProvider {
    pub fn new(config: &Config) -> Self {
        let client = Ollama::try_new(config.rag.ollama_host.clone())
            .unwrap_or_else(|_| Ollama::default());
        Self {
            client,
            model: config.rag.embedding_model.clone(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = GenerateEmbeddingsRequest::new(
            self.model.clone(),
            ollama_rs::generation::embeddings::request::EmbeddingsInput::Multiple(texts.to_vec()),
        );
        let response: GenerateEmbeddingsResponse = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| BookGeneratorError::EmbeddingError(e.to_string()))?;
        Ok(response
            .embeddings
            .into_iter()
            .map(|v| v.into_iter().collect())
            .collect())
    }

    async fn test_connection(&self) -> Result<bool> {
        Ok(self.embed_single("connection probe").await.is_ok())
    }
}

/// In-memory fake used by unit tests and by callers without a live embedding
/// backend configured. Produces a deterministic low-dimensional vector from
/// a simple hash of the text so similarity tests are repeatable.
pub struct FakeEmbeddingProvider {
    pub dimensions: usize,
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| deterministic_vector(t, self.dimensions)).collect())
    }

    async fn test_connection(&self) -> Result<bool> {
        Ok(true)
    }
}

fn deterministic_vector(text: &str, dimensions: usize) -> Vec<f32> {
    let mut seed: u64 = 1469598103934665603;
    for byte in text.bytes() {
        seed ^= byte as u64;
        seed = seed.wrapping_mul(1099511628211);
    }
    (0..dimensions)
        .map(|i| {
            let mixed = seed.wrapping_add(i as u64).wrapping_mul(2654435761);
            ((mixed % 2000) as f32 / 1000.0) - 1.0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_embedding_is_deterministic() {
        let provider = FakeEmbeddingProvider { dimensions: 8 };
        let a = provider.embed_single("hello").await.unwrap();
        let b = provider.embed_single("hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[tokio::test]
    async fn different_text_yields_different_vectors() {
        let provider = FakeEmbeddingProvider { dimensions: 8 };
        let a = provider.embed_single("hello").await.unwrap();
        let b = provider.embed_single("goodbye").await.unwrap();
        assert_ne!(a, b);
    }
}
