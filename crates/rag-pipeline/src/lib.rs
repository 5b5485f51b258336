//! rag-pipeline: orchestration layer for document ingestion and question answering
//!
//! This crate turns inbound events (Pub/Sub push notifications, pulled subscription
//! messages, or direct submissions) into ordered sequences of remote-call stages
//! against external chunk, embedding, vector-index, LLM and cache services. It tracks
//! per-stage failures, exposes asynchronous job status, and runs a long-lived
//! subscription worker with an explicit start/stop lifecycle.

pub mod cache;
pub mod config;
pub mod decode;
pub mod error;
pub mod pipeline;
pub mod processing;
pub mod providers;
pub mod retry;
pub mod server;
pub mod types;

pub use config::PipelineConfig;
pub use error::{Error, ErrorClass, Result};
pub use pipeline::{IngestOutcome, IngestionPipeline, PipelineFailure, QueryPipeline};
pub use processing::{InMemoryJobStore, JobRunner, JobStore, SubscriptionWorker, WorkerState};
pub use retry::{with_retry, RetryPolicy};
pub use types::{
    job::{JobDetails, JobRecord, JobStatus},
    message::IngestInput,
    query::QueryAnswer,
    stage::{Stage, StageError},
};
