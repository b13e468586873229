use async_trait::async_trait;

use crate::error::Result;

/// Produces dense vectors for batches of text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input, in order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Provider name for logs and collection metadata
    fn name(&self) -> &str;

    /// Model identifier for logs and collection metadata
    fn model(&self) -> &str;
}
