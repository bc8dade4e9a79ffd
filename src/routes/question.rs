use axum::{extract::State, routing::post, Json, Router};
use tracing::info;

use crate::models::{AppState, QuestionRequest, QuestionResponse};
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/question", post(ask_question))
        .with_state(state)
}

async fn ask_question(
    State(state): State<AppState>,
    Json(request): Json<QuestionRequest>,
) -> AppResult<Json<QuestionResponse>> {
    info!(document_id = request.document_id, "Question received");

    let answer = state
        .pipeline
        .answer_question(request.document_id, &request.question)
        .await?;

    Ok(Json(QuestionResponse {
        question: request.question,
        answer,
        document_id: request.document_id,
    }))
}
