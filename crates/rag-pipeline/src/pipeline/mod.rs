//! Stage sequencing for ingestion and question answering

mod ingest;
mod query;

pub use ingest::{IngestOutcome, IngestionPipeline};
pub use query::QueryPipeline;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::error::ErrorClass;
use crate::types::stage::StageError;

/// A run that halted at a fatal stage
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PipelineFailure {
    /// The stage that halted the run
    pub failed: StageError,
    /// Every stage error recorded during the run, the fatal one last
    pub errors: Vec<StageError>,
}

impl PipelineFailure {
    /// Close a run at `failed`, keeping earlier best-effort errors
    pub fn new(failed: StageError, mut errors: Vec<StageError>) -> Self {
        errors.push(failed.clone());
        Self { failed, errors }
    }

    pub fn class(&self) -> ErrorClass {
        self.failed.class
    }

    pub fn status_code(&self) -> StatusCode {
        match self.class() {
            ErrorClass::MalformedInput => StatusCode::BAD_REQUEST,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl std::fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} stage failed: {}", self.failed.stage, self.failed.cause)
    }
}

impl IntoResponse for PipelineFailure {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "stage": self.failed.stage,
                "message": self.to_string(),
            },
            "errors": self.errors,
        }));
        (self.status_code(), body).into_response()
    }
}
