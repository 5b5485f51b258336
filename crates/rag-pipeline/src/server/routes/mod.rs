//! HTTP routes

pub mod jobs;
pub mod push;
pub mod query;
pub mod subscription;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all pipeline routes
pub fn pipeline_routes(max_body_size: usize) -> Router<AppState> {
    Router::new()
        // Pub/Sub push endpoint (synchronous ingestion)
        .route("/", post(push::receive_push))
        // Asynchronous submission and job status
        .route("/ingest", post(jobs::submit_job))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job))
        // Question answering
        .route("/ask", post(query::ask))
        // Subscription worker administration
        .route("/subscription", get(subscription::status))
        .route("/subscription/start", post(subscription::start))
        .route("/subscription/stop", post(subscription::stop))
        .layer(DefaultBodyLimit::max(max_body_size))
}
