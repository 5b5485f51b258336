//! HTTP server for the pipeline

pub mod routes;
pub mod state;

use std::net::SocketAddr;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use state::AppState;

/// Pipeline HTTP server
pub struct PipelineServer {
    state: AppState,
}

impl PipelineServer {
    /// Create a server with REST collaborators from configuration
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Ok(Self::with_state(AppState::from_config(config)?))
    }

    pub fn with_state(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let config = self.state.config();

        let router = Router::new()
            .route("/health", get(health_check))
            .merge(routes::pipeline_routes(config.server.max_body_size))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if config.server.enable_cors {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        }
    }

    /// Serve until Ctrl+C, then stop the subscription worker
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = self.build_router();

        tracing::info!("Starting pipeline server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        if let Some(worker) = self.state.worker() {
            worker.stop().await;
        }
        tracing::info!("Pipeline server stopped");

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        self.state.config().bind_address()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub problems: Vec<String>,
}

/// Health check endpoint
///
/// Always 200; `degraded` lists missing settings, an unreachable cache and a
/// crashed worker.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let problems = state.problems().await;
    let status = if problems.is_empty() { "ok" } else { "degraded" };
    Json(HealthResponse { status, problems })
}
