//! Asynchronous submission and job status routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::processing::JobStats;
use crate::server::state::AppState;
use crate::types::job::{JobDetails, JobRecord, JobStatus};
use crate::types::message::IngestInput;

/// `POST /ingest` body: `{text, filename}` or `{bucket, name}`, optionally with a job id
#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl SubmitRequest {
    fn into_input(self) -> Result<(IngestInput, Option<String>)> {
        let input = match (self.bucket, self.name, self.text) {
            (Some(bucket), Some(name), None) => IngestInput::Object { bucket, name },
            (None, None, Some(text)) => IngestInput::Text {
                text,
                filename: self.filename,
            },
            _ => {
                return Err(Error::invalid_input(
                    "provide either {text, filename} or {bucket, name}",
                ))
            }
        };
        Ok((input, self.job_id))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub details: JobDetails,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<JobRecord> for JobResponse {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            status: record.status,
            details: record.details,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    pub stats: JobStats,
}

/// Accept a job and run it in the background
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let (input, job_id) = request.into_input()?;
    let ticket = state.runner().submit(input, job_id)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: ticket.job_id,
            status: JobStatus::Accepted,
        }),
    ))
}

/// Current state of one job
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResponse>> {
    let record = state
        .job_store()
        .get(&job_id)
        .ok_or_else(|| Error::NotFound(format!("Job {} not found", job_id)))?;
    Ok(Json(record.into()))
}

/// All jobs plus per-status counts
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    let store = state.job_store();
    Json(JobListResponse {
        jobs: store.list().into_iter().map(JobResponse::from).collect(),
        stats: store.stats(),
    })
}
