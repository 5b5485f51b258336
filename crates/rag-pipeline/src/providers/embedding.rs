//! Embedding provider trait

use async_trait::async_trait;

use crate::error::Result;

/// Turns chunks into vectors, one per chunk and in the same order
///
/// Implementations:
/// - `VertexEmbedder`: Vertex AI `predict` endpoint
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
