//! Pub/Sub push endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::error::Error;
use crate::pipeline::PipelineFailure;
use crate::server::state::AppState;
use crate::types::message::{decode_payload, IngestResponse, PushEnvelope};
use crate::types::stage::StageError;

/// Decode the envelope and ingest synchronously
///
/// 200 with `{acknowledged, errors, stored}` on success, 400 when the envelope
/// or its payload cannot be decoded, 503 when a remote stage fails.
pub async fn receive_push(
    State(state): State<AppState>,
    envelope: Result<Json<PushEnvelope>, JsonRejection>,
) -> Result<Json<IngestResponse>, PipelineFailure> {
    let Json(envelope) = envelope.map_err(|rejection| {
        let error = Error::invalid_input(format!("invalid push envelope: {}", rejection.body_text()));
        tracing::warn!("{}", error);
        PipelineFailure::new(StageError::decode(&error), Vec::new())
    })?;

    let message_id = envelope
        .message
        .message_id
        .clone()
        .unwrap_or_else(|| "-".to_string());

    let input = decode_payload(envelope.message.data.as_deref()).map_err(|e| {
        tracing::warn!("[{}] Decode error: {}", message_id, e);
        PipelineFailure::new(StageError::decode(&e), Vec::new())
    })?;

    tracing::info!("[{}] Push received for {}", message_id, input.describe());
    let response = state.ingestion().run(&input).await.into_push_response()?;
    Ok(Json(response))
}
