//! Embedding provider trait

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::error::Result;

/// Turns text into dense vectors for similarity search
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order
    ///
    /// Default implementation runs `embed` concurrently and fails on the first error.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        try_join_all(texts.iter().map(|text| self.embed(text))).await
    }

    /// Get provider name for logging
    fn name(&self) -> &str;
}
