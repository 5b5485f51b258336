//! REST implementations of the collaborator traits

pub mod chunk_service;
pub mod client;
pub mod gcs;
pub mod gemini;
pub mod pubsub;
pub mod vertex_embedder;
pub mod vertex_vector;

pub use chunk_service::HttpChunker;
pub use client::HttpClient;
pub use gcs::GcsObjectFetcher;
pub use gemini::GeminiGenerator;
pub use pubsub::PubSubSource;
pub use vertex_embedder::VertexEmbedder;
pub use vertex_vector::VertexVectorIndex;
