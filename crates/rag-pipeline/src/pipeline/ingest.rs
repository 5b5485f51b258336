//! Ingestion: Download -> Chunk -> Embed -> Store

use std::sync::Arc;

use super::PipelineFailure;
use crate::error::{Error, Result};
use crate::providers::{ChunkInput, Chunker, Embedder, ObjectFetcher, StoreAck, VectorIndex};
use crate::retry::RetryPolicy;
use crate::types::job::{IngestSummary, JobDetails, JobStatus};
use crate::types::message::{IngestInput, IngestResponse};
use crate::types::stage::{Stage, StageError};

/// Terminal outcome of one ingestion run
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Success {
        summary: IngestSummary,
        errors: Vec<StageError>,
    },
    Failed(PipelineFailure),
}

impl IngestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, IngestOutcome::Success { .. })
    }

    pub fn errors(&self) -> &[StageError] {
        match self {
            IngestOutcome::Success { errors, .. } => errors,
            IngestOutcome::Failed(failure) => &failure.errors,
        }
    }

    /// Terminal job status and details for the job store
    pub fn into_job_update(self) -> (JobStatus, JobDetails) {
        match self {
            IngestOutcome::Success { summary, errors } => (
                JobStatus::Done,
                JobDetails {
                    errors,
                    result: Some(summary),
                },
            ),
            IngestOutcome::Failed(failure) => (
                JobStatus::Failed,
                JobDetails {
                    errors: failure.errors,
                    result: None,
                },
            ),
        }
    }

    /// Synchronous push response, or the failure to report
    pub fn into_push_response(self) -> std::result::Result<IngestResponse, PipelineFailure> {
        match self {
            IngestOutcome::Success { summary, errors } => Ok(IngestResponse {
                acknowledged: true,
                errors,
                stored: summary.stored,
            }),
            IngestOutcome::Failed(failure) => Err(failure),
        }
    }
}

/// Runs the ingestion stages for one input
pub struct IngestionPipeline {
    fetcher: Arc<dyn ObjectFetcher>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    retry: RetryPolicy,
}

impl IngestionPipeline {
    pub fn new(
        fetcher: Arc<dyn ObjectFetcher>,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            fetcher,
            chunker,
            embedder,
            index,
            retry,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Run every stage in order, halting at the first failure
    pub async fn run(&self, input: &IngestInput) -> IngestOutcome {
        if let Err(e) = input.validate() {
            tracing::error!("Rejected ingest input: {}", e);
            return IngestOutcome::Failed(PipelineFailure::new(StageError::decode(&e), Vec::new()));
        }

        let label = input.describe();
        tracing::info!("[{}] Starting ingestion", label);

        // The downloaded object lives until the end of the run and is removed on drop
        let (chunks, _download) = match input {
            IngestInput::Object { bucket, name } => {
                let object = match self
                    .retry
                    .run("download", || self.fetcher.fetch(bucket, name))
                    .await
                {
                    Ok(object) => object,
                    Err(e) => return fail(&label, Stage::Download, &e),
                };
                let chunks = self
                    .chunk(ChunkInput::File {
                        path: &object.path,
                        filename: &object.filename,
                    })
                    .await;
                (chunks, Some(object))
            }
            IngestInput::Text { text, .. } => (self.chunk(ChunkInput::Text(text)).await, None),
        };

        let chunks = match chunks {
            Ok(chunks) => chunks,
            Err(e) => return fail(&label, Stage::Chunk, &e),
        };
        tracing::info!("[{}] Chunked into {} chunks", label, chunks.len());

        let vectors = match self.embed(&chunks).await {
            Ok(vectors) => vectors,
            Err(e) => return fail(&label, Stage::Embed, &e),
        };
        tracing::info!("[{}] Embedded {} chunks", label, vectors.len());

        let ack: StoreAck = match self.retry.run("store", || self.index.store(&vectors)).await {
            Ok(ack) => ack,
            Err(e) => return fail(&label, Stage::Store, &e),
        };
        tracing::info!("[{}] Stored {} vectors", label, ack.stored);

        IngestOutcome::Success {
            summary: IngestSummary {
                stored: ack.stored,
                acknowledgment: ack.response,
            },
            errors: Vec::new(),
        }
    }

    async fn chunk(&self, input: ChunkInput<'_>) -> Result<Vec<String>> {
        let chunks = self.retry.run("chunk", || self.chunker.chunk(input)).await?;
        if chunks.is_empty() {
            return Err(Error::malformed("chunk", "Chunk service returned empty"));
        }
        Ok(chunks)
    }

    async fn embed(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.retry.run("embed", || self.embedder.embed(chunks)).await?;
        if vectors.is_empty() {
            return Err(Error::malformed("embedding", "No embeddings returned"));
        }
        if vectors.len() != chunks.len() {
            return Err(Error::malformed(
                "embedding",
                format!(
                    "expected {} embeddings, received {}",
                    chunks.len(),
                    vectors.len()
                ),
            ));
        }
        Ok(vectors)
    }
}

fn fail(label: &str, stage: Stage, error: &Error) -> IngestOutcome {
    tracing::error!("[{}] {} stage failed: {}", label, stage, error);
    IngestOutcome::Failed(PipelineFailure::new(
        StageError::ingest(stage, error),
        Vec::new(),
    ))
}
