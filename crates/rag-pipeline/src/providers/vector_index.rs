//! Vector index trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Store acknowledgment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreAck {
    /// Number of vectors accepted
    pub stored: usize,
    /// Collaborator response body
    pub response: Value,
}

/// One ranked search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Neighbor {
    pub id: Option<String>,
    pub distance: Option<f64>,
    /// Opaque payload as returned by the index
    pub raw: Value,
}

/// Stores vectors and finds nearest neighbors
///
/// Implementations:
/// - `VertexVectorIndex`: Vertex AI Vector Search (`upsertDatapoints`, `findNeighbors`)
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn store(&self, vectors: &[Vec<f32>]) -> Result<StoreAck>;

    /// Ranked neighbors, best first
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    fn name(&self) -> &str;
}
