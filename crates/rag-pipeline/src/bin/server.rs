//! Pipeline server binary
//!
//! Run with: cargo run -p rag-pipeline --bin rag-pipeline-server

use rag_pipeline::{config::PipelineConfig, server::PipelineServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_pipeline=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - LLM model: {}", config.llm.model_id);
    tracing::info!("  - Retry attempts: {}", config.retry.max_attempts);
    tracing::info!("  - Neighbor count: {}", config.query.neighbor_count);
    for problem in config.problems() {
        tracing::warn!("  - {}", problem);
    }

    let auto_start = config.subscription.auto_start;
    let server = PipelineServer::new(config)?;

    if auto_start {
        if let Some(worker) = server.state().worker() {
            match worker.start().await {
                Ok(()) => tracing::info!("Subscription worker started"),
                Err(e) => tracing::error!("Subscription worker failed to start: {}", e),
            }
        }
    }

    println!("\nServer starting...");
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST /                    - Pub/Sub push ingestion");
    println!("  POST /ingest              - Submit an ingestion job");
    println!("  GET  /jobs/:id            - Job status");
    println!("  POST /ask                 - Ask a question");
    println!("  POST /subscription/start  - Start the pull worker");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
