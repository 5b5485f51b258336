//! Pipeline stages and per-stage failures

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, ErrorClass};

/// A named step of the ingestion or query pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Payload decoding at the push/pull edge
    Decode,
    Download,
    CacheLookup,
    Chunk,
    Embed,
    VectorSearch,
    Generate,
    Store,
    CacheWrite,
}

/// Ingestion stages in execution order
pub const INGEST_STAGES: [Stage; 4] = [Stage::Download, Stage::Chunk, Stage::Embed, Stage::Store];

/// Query stages in execution order
pub const QUERY_STAGES: [Stage; 6] = [
    Stage::CacheLookup,
    Stage::Chunk,
    Stage::Embed,
    Stage::VectorSearch,
    Stage::Generate,
    Stage::CacheWrite,
];

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Download => "download",
            Stage::CacheLookup => "cache_lookup",
            Stage::Chunk => "chunk",
            Stage::Embed => "embed",
            Stage::VectorSearch => "vector_search",
            Stage::Generate => "generate",
            Stage::Store => "store",
            Stage::CacheWrite => "cache_write",
        }
    }

    /// 1-based position in the ingestion sequence (0 for decode)
    pub fn ingest_position(&self) -> usize {
        position_in(&INGEST_STAGES, *self)
    }

    /// 1-based position in the query sequence (0 for decode)
    pub fn query_position(&self) -> usize {
        position_in(&QUERY_STAGES, *self)
    }

    /// Best-effort stages record failures and let the run continue
    pub fn is_best_effort(&self) -> bool {
        matches!(
            self,
            Stage::CacheLookup | Stage::VectorSearch | Stage::CacheWrite
        )
    }
}

fn position_in(stages: &[Stage], stage: Stage) -> usize {
    stages
        .iter()
        .position(|s| *s == stage)
        .map(|i| i + 1)
        .unwrap_or(0)
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure recorded against one stage of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageError {
    pub stage: Stage,
    /// Human-readable cause
    #[serde(rename = "error")]
    pub cause: String,
    /// Ordinal position of the stage in its pipeline
    pub position: usize,
    pub class: ErrorClass,
    /// Attempts made before giving up
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

impl StageError {
    pub fn new(stage: Stage, position: usize, error: &Error) -> Self {
        Self {
            stage,
            cause: error.root().to_string(),
            position,
            class: error.class(),
            attempts: error.attempts(),
        }
    }

    pub fn ingest(stage: Stage, error: &Error) -> Self {
        Self::new(stage, stage.ingest_position(), error)
    }

    pub fn query(stage: Stage, error: &Error) -> Self {
        Self::new(stage, stage.query_position(), error)
    }

    /// Decode failure at the push/pull edge
    pub fn decode(error: &Error) -> Self {
        Self::new(Stage::Decode, 0, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_positions() {
        assert_eq!(Stage::Download.ingest_position(), 1);
        assert_eq!(Stage::Store.ingest_position(), 4);
        assert_eq!(Stage::CacheLookup.query_position(), 1);
        assert_eq!(Stage::VectorSearch.query_position(), 4);
        assert_eq!(Stage::Decode.ingest_position(), 0);
    }

    #[test]
    fn test_stage_error_serialization() {
        let err = StageError::query(Stage::VectorSearch, &Error::remote("vector", "503"));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["stage"], json!("vector_search"));
        assert_eq!(value["position"], json!(4));
        assert_eq!(value["class"], json!("transient"));
        assert!(value["error"].as_str().unwrap().contains("503"));
    }
}
