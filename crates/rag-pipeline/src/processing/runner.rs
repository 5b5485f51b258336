//! Asynchronous ingestion jobs

use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::job_store::JobStore;
use crate::error::Result;
use crate::pipeline::IngestionPipeline;
use crate::types::job::{JobDetails, JobStatus};
use crate::types::message::IngestInput;

/// Handle to a submitted job
pub struct JobTicket {
    pub job_id: String,
    /// Resolves to the terminal status once the run ends
    pub completion: JoinHandle<JobStatus>,
}

/// Records jobs in the store and runs them on background tasks
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    pipeline: Arc<IngestionPipeline>,
}

impl JobRunner {
    pub fn new(store: Arc<dyn JobStore>, pipeline: Arc<IngestionPipeline>) -> Self {
        Self { store, pipeline }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Record the job as accepted and start it; a missing id is generated
    pub fn submit(&self, input: IngestInput, job_id: Option<String>) -> Result<JobTicket> {
        input.validate()?;

        let job_id = match job_id.map(|id| id.trim().to_string()) {
            Some(id) if !id.is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };
        self.store
            .insert_new(&job_id, JobStatus::Accepted, JobDetails::default())?;
        tracing::info!("[{}] Accepted {}", job_id, input.describe());

        let store = Arc::clone(&self.store);
        let pipeline = Arc::clone(&self.pipeline);
        let id = job_id.clone();

        let completion = tokio::spawn(async move {
            if let Err(e) = store.put(&id, JobStatus::Running, JobDetails::default()) {
                tracing::error!("[{}] Could not mark job running: {}", id, e);
                return JobStatus::Failed;
            }

            let (status, details) = pipeline.run(&input).await.into_job_update();
            match status {
                JobStatus::Done => tracing::info!("[{}] Job completed", id),
                _ => tracing::error!("[{}] Job failed with {} error(s)", id, details.errors.len()),
            }

            if let Err(e) = store.put(&id, status, details) {
                tracing::error!("[{}] Could not record job outcome: {}", id, e);
            }
            status
        });

        Ok(JobTicket { job_id, completion })
    }
}
