//! Question answering route

use axum::{extract::State, Json};

use crate::pipeline::PipelineFailure;
use crate::server::state::AppState;
use crate::types::query::{QueryAnswer, QuestionRequest};

/// `POST /ask`
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<QueryAnswer>, PipelineFailure> {
    let answer = state.query().ask(&request.question).await?;
    tracing::info!(
        "Answered question (found={}, contexts={}, errors={})",
        answer.found,
        answer.contexts_count,
        answer.errors.len()
    );
    Ok(Json(answer))
}
