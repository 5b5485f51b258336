//! Decoders for collaborator response bodies
//!
//! Collaborators answer in several shapes depending on model version and
//! deployment. Each decoder is an untagged enum tried in order, with a final
//! catch-all variant so an unexpected body is either used verbatim or reported
//! as a malformed response (never silently dropped). List variants come before
//! struct variants because serde also accepts a struct from a sequence.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::providers::Neighbor;

/// Render a JSON value as text: strings unquoted, everything else serialized
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn preview(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > 2000 {
        text.chars().take(2000).collect::<String>() + "..."
    } else {
        text
    }
}

// ============================================================================
// Chunk service
// ============================================================================

/// Body returned by the chunk service
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChunkResponse {
    /// A bare list of chunks
    List(Vec<ChunkItem>),
    /// `{"chunks": [...], ...}`
    Chunks { chunks: Vec<ChunkItem> },
    /// `{"error": "Unsupported file type"}`
    Failure { error: Value },
    /// `{"result": ...}`
    Single { result: Value },
    /// Anything else is used as a single chunk
    Raw(Value),
}

/// One element of a chunk list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChunkItem {
    Text(String),
    WithText { text: String },
    WithContent { content: String },
    Raw(Value),
}

impl ChunkItem {
    pub fn into_text(self) -> String {
        match self {
            ChunkItem::Text(text) | ChunkItem::WithText { text } => text,
            ChunkItem::WithContent { content } => content,
            ChunkItem::Raw(value) => value_text(&value),
        }
    }
}

impl ChunkResponse {
    pub fn into_chunks(self) -> Result<Vec<String>> {
        match self {
            ChunkResponse::Chunks { chunks } | ChunkResponse::List(chunks) => {
                Ok(chunks.into_iter().map(ChunkItem::into_text).collect())
            }
            ChunkResponse::Failure { error } => Err(Error::invalid_input(value_text(&error))),
            ChunkResponse::Single { result } => Ok(vec![value_text(&result)]),
            ChunkResponse::Raw(value) => {
                tracing::warn!("Unrecognized chunk response, using it verbatim");
                Ok(vec![value.to_string()])
            }
        }
    }
}

/// Decode a chunk service body into chunk texts
pub fn decode_chunks(body: Value) -> Result<Vec<String>> {
    serde_json::from_value::<ChunkResponse>(body)?.into_chunks()
}

// ============================================================================
// Embeddings
// ============================================================================

/// Body returned by the embedding endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingResponse {
    /// A bare list of vectors
    Vectors(Vec<Vec<f32>>),
    /// Vertex `predict` response
    Predictions { predictions: Vec<Prediction> },
    Unrecognized(Value),
}

/// One prediction, in any of the field layouts models use
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    Embeddings { embeddings: EmbeddingField },
    Embedding { embedding: EmbeddingField },
    Vector { vector: EmbeddingField },
    Unrecognized(Value),
}

/// `{"values": [...]}` or a bare vector
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingField {
    Values { values: Vec<f32> },
    List(Vec<f32>),
}

impl EmbeddingField {
    fn into_vector(self) -> Vec<f32> {
        match self {
            EmbeddingField::Values { values } => values,
            EmbeddingField::List(values) => values,
        }
    }
}

impl EmbeddingResponse {
    pub fn into_vectors(self) -> Result<Vec<Vec<f32>>> {
        match self {
            EmbeddingResponse::Predictions { predictions } => predictions
                .into_iter()
                .enumerate()
                .map(|(i, prediction)| match prediction {
                    Prediction::Embeddings { embeddings: field }
                    | Prediction::Embedding { embedding: field }
                    | Prediction::Vector { vector: field } => Ok(field.into_vector()),
                    Prediction::Unrecognized(raw) => {
                        tracing::error!("Unexpected embedding prediction {}: {}", i, preview(&raw));
                        Err(Error::malformed(
                            "embedding",
                            format!("prediction {} has no embedding values", i),
                        ))
                    }
                })
                .collect(),
            EmbeddingResponse::Vectors(vectors) => Ok(vectors),
            EmbeddingResponse::Unrecognized(raw) => {
                tracing::error!("Unexpected embedding response: {}", preview(&raw));
                Err(Error::malformed("embedding", "unexpected response format"))
            }
        }
    }
}

/// Decode an embedding endpoint body into vectors
pub fn decode_embeddings(body: Value) -> Result<Vec<Vec<f32>>> {
    serde_json::from_value::<EmbeddingResponse>(body)?.into_vectors()
}

// ============================================================================
// Vector search
// ============================================================================

/// Body returned by a neighbor search
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SearchResponse {
    List(Vec<Value>),
    /// Vertex `findNeighbors`: one group per query
    Nearest {
        #[serde(rename = "nearestNeighbors", alias = "nearest_neighbors")]
        nearest_neighbors: Vec<NeighborGroup>,
    },
    /// `neighbors`, `results` or `matches` holding a flat list
    Keyed {
        #[serde(alias = "results", alias = "matches")]
        neighbors: Vec<Value>,
    },
    Unrecognized(Value),
}

/// A per-query group, or a neighbor listed directly
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NeighborGroup {
    Group { neighbors: Vec<Value> },
    Single(Value),
}

impl SearchResponse {
    /// Flatten into ranked neighbors, best first
    pub fn into_neighbors(self) -> Result<Vec<Neighbor>> {
        let raw: Vec<Value> = match self {
            SearchResponse::Nearest { nearest_neighbors } => nearest_neighbors
                .into_iter()
                .flat_map(|group| match group {
                    NeighborGroup::Group { neighbors } => neighbors,
                    NeighborGroup::Single(value) => vec![value],
                })
                .collect(),
            SearchResponse::Keyed { neighbors } | SearchResponse::List(neighbors) => neighbors,
            SearchResponse::Unrecognized(raw) => {
                tracing::error!("Unexpected vector search response: {}", preview(&raw));
                return Err(Error::malformed("vector search", "unexpected response format"));
            }
        };

        Ok(raw.into_iter().map(neighbor_from_value).collect())
    }
}

fn neighbor_from_value(raw: Value) -> Neighbor {
    let id = raw
        .get("datapoint")
        .and_then(|dp| dp.get("datapointId"))
        .or_else(|| raw.get("id"))
        .map(value_text);
    let distance = raw.get("distance").and_then(Value::as_f64);
    Neighbor { id, distance, raw }
}

/// Decode a neighbor search body
pub fn decode_neighbors(body: Value) -> Result<Vec<Neighbor>> {
    serde_json::from_value::<SearchResponse>(body)?.into_neighbors()
}

/// Keys a neighbor may carry its payload under, in order of preference
#[derive(Deserialize)]
struct NeighborFields {
    datapoint: Option<Value>,
    payload: Option<Value>,
    data: Option<Value>,
    #[serde(rename = "match")]
    matched: Option<Value>,
}

impl NeighborFields {
    fn preferred(self) -> Option<Value> {
        self.datapoint
            .or(self.payload)
            .or(self.data)
            .or(self.matched)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PayloadShape {
    Text {
        text: String,
    },
    Content {
        content: String,
    },
    Data {
        data: String,
    },
    DisplayName {
        #[serde(rename = "displayName")]
        display_name: String,
    },
    Plain(String),
    Raw(Value),
}

/// Context text carried by a neighbor payload, falling back to its JSON
pub fn neighbor_text(raw: &Value) -> String {
    if let Value::String(text) = raw {
        return text.clone();
    }
    let payload = serde_json::from_value::<NeighborFields>(raw.clone())
        .ok()
        .and_then(NeighborFields::preferred);
    let Some(payload) = payload else {
        return raw.to_string();
    };

    match serde_json::from_value::<PayloadShape>(payload) {
        Ok(PayloadShape::Text { text }) => text,
        Ok(PayloadShape::Content { content }) => content,
        Ok(PayloadShape::Data { data }) => data,
        Ok(PayloadShape::DisplayName { display_name }) => display_name,
        Ok(PayloadShape::Plain(text)) => text,
        Ok(PayloadShape::Raw(value)) if value.is_object() => value.to_string(),
        _ => raw.to_string(),
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Body (or one stream line) returned by the LLM endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GenerationResponse {
    Candidates {
        #[serde(alias = "predictions", alias = "responses")]
        candidates: Vec<Candidate>,
    },
    Field(TextField),
    Raw(Value),
}

/// First-level candidate
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Candidate {
    Content { content: CandidateContent },
    Field(TextField),
    Raw(Value),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    Plain(String),
    Raw(Value),
}

/// `output`, `message` or `text`, checked in that order
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextField {
    Output { output: Value },
    Message { message: Value },
    Text { text: Value },
}

impl TextField {
    fn into_text(self) -> String {
        match self {
            TextField::Output { output: v }
            | TextField::Message { message: v }
            | TextField::Text { text: v } => value_text(&v),
        }
    }
}

impl Part {
    fn into_text(self) -> String {
        match self {
            Part::Text { text } | Part::Plain(text) => text,
            Part::Raw(value) => value.to_string(),
        }
    }
}

impl GenerationResponse {
    /// Text of the first candidate, parts joined with `joiner`
    fn into_text(self, joiner: &str) -> Option<String> {
        match self {
            GenerationResponse::Candidates { candidates } => {
                let first = candidates.into_iter().next()?;
                Some(match first {
                    Candidate::Content { content } => content
                        .parts
                        .into_iter()
                        .map(Part::into_text)
                        .collect::<Vec<_>>()
                        .join(joiner),
                    Candidate::Field(field) => field.into_text(),
                    Candidate::Raw(value) => value.to_string(),
                })
            }
            GenerationResponse::Field(field) => Some(field.into_text()),
            GenerationResponse::Raw(_) => None,
        }
    }
}

/// Answer text from a complete (non-streamed) response
pub fn generation_text(body: &Value) -> String {
    if let Value::String(text) = body {
        return text.clone();
    }
    serde_json::from_value::<GenerationResponse>(body.clone())
        .ok()
        .and_then(|r| r.into_text("\n"))
        .unwrap_or_else(|| {
            tracing::warn!("Unrecognized LLM response, returning it verbatim");
            body.to_string()
        })
}

/// Text carried by one line of a streamed response, if any
pub fn stream_fragment(line: &Value) -> Option<String> {
    serde_json::from_value::<GenerationResponse>(line.clone())
        .ok()
        .and_then(|r| r.into_text(""))
}
