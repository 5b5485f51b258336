//! HTTP chunk service client

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::json;

use super::client::{require, HttpClient};
use crate::config::PipelineConfig;
use crate::decode::decode_chunks;
use crate::error::Result;
use crate::providers::chunker::{ChunkInput, Chunker};

/// Posts files (multipart) or text (JSON) to `<chunk_url>/chunk`
pub struct HttpChunker {
    http: HttpClient,
    endpoint: Option<String>,
    chunk_size: usize,
}

impl HttpChunker {
    pub fn new(http: HttpClient, config: &PipelineConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoints.chunk_url.as_deref().map(chunk_endpoint),
            chunk_size: config.query.chunk_size,
        }
    }
}

/// Append `/chunk` to a base URL unless already present
pub fn chunk_endpoint(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/chunk") {
        base.to_string()
    } else {
        format!("{}/chunk", base)
    }
}

#[async_trait]
impl Chunker for HttpChunker {
    async fn chunk(&self, input: ChunkInput<'_>) -> Result<Vec<String>> {
        let url = require(&self.endpoint, "CHUNK_URL")?;

        let request = match input {
            ChunkInput::File { path, filename } => {
                tracing::info!("Calling chunk service for file: {}", filename);
                let bytes = tokio::fs::read(path).await?;
                let form = Form::new()
                    .part("file", Part::bytes(bytes).file_name(filename.to_string()))
                    .text("chunk_size", self.chunk_size.to_string());
                self.http.post(url).multipart(form)
            }
            ChunkInput::Text(text) => {
                tracing::info!("Calling chunk service for {} chars of text", text.len());
                self.http
                    .post(url)
                    .json(&json!({ "text": text, "chunk_size": self.chunk_size }))
            }
        };

        let body = self.http.send_json("chunk", request).await?;
        decode_chunks(body)
    }

    fn name(&self) -> &str {
        "chunk-service"
    }
}
