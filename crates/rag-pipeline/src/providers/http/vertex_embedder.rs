//! Vertex AI embedding client

use async_trait::async_trait;
use serde::Serialize;

use super::client::{require, HttpClient};
use crate::config::PipelineConfig;
use crate::decode::decode_embeddings;
use crate::error::Result;
use crate::providers::embedding::Embedder;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    instances: Vec<EmbedInstance<'a>>,
}

#[derive(Serialize)]
struct EmbedInstance<'a> {
    task_type: &'static str,
    title: &'static str,
    content: &'a str,
}

/// Vertex `predict` embedder
pub struct VertexEmbedder {
    http: HttpClient,
    endpoint: Option<String>,
}

impl VertexEmbedder {
    pub fn new(http: HttpClient, config: &PipelineConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoints.embedding_endpoint.clone(),
        }
    }
}

#[async_trait]
impl Embedder for VertexEmbedder {
    async fn embed(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = require(&self.endpoint, "EMBEDDING_ENDPOINT")?;

        let request = EmbedRequest {
            instances: chunks
                .iter()
                .map(|content| EmbedInstance {
                    task_type: "RETRIEVAL_DOCUMENT",
                    title: "document",
                    content,
                })
                .collect(),
        };

        tracing::info!("Requesting embeddings for {} chunks", chunks.len());
        let body = self
            .http
            .send_json("embedding", self.http.post(url).json(&request))
            .await?;
        decode_embeddings(body)
    }

    fn name(&self) -> &str {
        "vertex-embedding"
    }
}
