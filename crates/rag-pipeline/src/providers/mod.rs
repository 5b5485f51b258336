//! Collaborator abstractions for storage, chunking, embeddings, vector search,
//! generation, caching and message subscriptions
//!
//! Each pipeline stage calls one of these traits. The `http` module holds the
//! REST implementations; `local` holds filesystem-backed ones.

pub mod cache;
pub mod chunker;
pub mod embedding;
pub mod generator;
pub mod http;
pub mod local;
pub mod object_store;
pub mod subscription;
pub mod vector_index;

pub use cache::AnswerCache;
pub use chunker::{ChunkInput, Chunker};
pub use embedding::Embedder;
pub use generator::{compose_prompt, Generator};
pub use object_store::{DownloadedObject, ObjectFetcher};
pub use subscription::{ReceivedMessage, Subscription, SubscriptionSource};
pub use vector_index::{Neighbor, StoreAck, VectorIndex};
