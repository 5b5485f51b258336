//! Subscription worker administration

use axum::{extract::State, Json};

use crate::error::{Error, Result};
use crate::processing::{SubscriptionWorker, WorkerStatus};
use crate::server::state::AppState;

fn worker(state: &AppState) -> Result<&SubscriptionWorker> {
    state
        .worker()
        .ok_or_else(|| Error::NotFound("no subscription worker configured".to_string()))
}

/// Worker state and counters
pub async fn status(State(state): State<AppState>) -> Result<Json<WorkerStatus>> {
    Ok(Json(worker(&state)?.status()))
}

/// Start the worker; no-op when already running
pub async fn start(State(state): State<AppState>) -> Result<Json<WorkerStatus>> {
    let worker = worker(&state)?;
    worker.start().await?;
    Ok(Json(worker.status()))
}

/// Stop the worker; no-op when not running
pub async fn stop(State(state): State<AppState>) -> Result<Json<WorkerStatus>> {
    let worker = worker(&state)?;
    worker.stop().await;
    Ok(Json(worker.status()))
}
