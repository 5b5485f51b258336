//! Vertex AI Vector Search client

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use super::client::{require, HttpClient};
use crate::config::PipelineConfig;
use crate::decode::decode_neighbors;
use crate::error::Result;
use crate::providers::vector_index::{Neighbor, StoreAck, VectorIndex};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    deployed_index_id: Option<&'a str>,
    datapoints: Vec<DataPoint<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataPoint<'a> {
    datapoint_id: String,
    feature_vector: &'a [f32],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FindNeighborsRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    deployed_index_id: Option<&'a str>,
    queries: Vec<QueryItem<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryItem<'a> {
    datapoint: QueryDatapoint<'a>,
    neighbor_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryDatapoint<'a> {
    feature_vector: &'a [f32],
}

/// Vertex vector index: `upsertDatapoints` for store, `findNeighbors` for search
pub struct VertexVectorIndex {
    http: HttpClient,
    search_endpoint: Option<String>,
    store_endpoint: Option<String>,
    deployed_index_id: Option<String>,
}

impl VertexVectorIndex {
    pub fn new(http: HttpClient, config: &PipelineConfig) -> Self {
        let ep = &config.endpoints;
        Self {
            http,
            search_endpoint: ep.vector_search_endpoint.clone(),
            store_endpoint: ep.vector_store_endpoint.clone(),
            deployed_index_id: ep.deployed_index_id.clone(),
        }
    }
}

#[async_trait]
impl VectorIndex for VertexVectorIndex {
    async fn store(&self, vectors: &[Vec<f32>]) -> Result<StoreAck> {
        let url = require(&self.store_endpoint, "VECTOR_STORE_ENDPOINT")?;

        let request = UpsertRequest {
            deployed_index_id: self.deployed_index_id.as_deref(),
            datapoints: vectors
                .iter()
                .map(|v| DataPoint {
                    datapoint_id: Uuid::new_v4().to_string(),
                    feature_vector: v,
                })
                .collect(),
        };

        tracing::info!("Upserting {} datapoints", vectors.len());
        let response = self
            .http
            .send_json("vector store", self.http.post(url).json(&request))
            .await?;

        Ok(StoreAck {
            stored: vectors.len(),
            response,
        })
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let url = require(&self.search_endpoint, "VECTOR_DB_ENDPOINT")?;

        let request = FindNeighborsRequest {
            deployed_index_id: self.deployed_index_id.as_deref(),
            queries: vec![QueryItem {
                datapoint: QueryDatapoint {
                    feature_vector: vector,
                },
                neighbor_count: k,
            }],
        };

        tracing::info!("Searching vector index for {} neighbors", k);
        let body = self
            .http
            .send_json("vector search", self.http.post(url).json(&request))
            .await?;
        decode_neighbors(body)
    }

    fn name(&self) -> &str {
        "vertex-vector-search"
    }
}
