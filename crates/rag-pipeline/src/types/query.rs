//! Question answering request and response

use serde::{Deserialize, Serialize};

use super::stage::StageError;

/// `POST /ask` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRequest {
    #[serde(default)]
    pub question: String,
}

/// Answer returned by the query pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryAnswer {
    /// True when served from cache
    pub found: bool,
    /// Normalized question text
    pub question: String,
    pub answer: String,
    /// Number of contexts passed to the generator
    pub contexts_count: usize,
    /// Best-effort stage failures, present even on success
    #[serde(default)]
    pub errors: Vec<StageError>,
}
