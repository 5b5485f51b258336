//! Chunk service trait

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

/// What to split into chunks
#[derive(Debug, Clone, Copy)]
pub enum ChunkInput<'a> {
    /// A local file, typically a downloaded object
    File { path: &'a Path, filename: &'a str },
    /// Inline text
    Text(&'a str),
}

/// Splits a document or text into chunks
#[async_trait]
pub trait Chunker: Send + Sync {
    async fn chunk(&self, input: ChunkInput<'_>) -> Result<Vec<String>>;

    fn name(&self) -> &str;
}
