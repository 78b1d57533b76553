use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::ServiceError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::progress::{
        FlashcardSessionRequest, FlashcardSessionResponse, QuizAttemptResponse,
        RecordQuizAttemptRequest,
    },
    services::{
        quiz_scoring::QuizScoringService, study_pack_service::StudyPackService, AppState,
    },
};

pub async fn record_quiz_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<RecordQuizAttemptRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let attempt = QuizScoringService::new(state.repo.clone())
        .record_quiz_attempt(&claims.caller(), req)
        .await?;
    Ok(Json(QuizAttemptResponse::from(attempt)))
}

pub async fn list_flashcards(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(study_pack_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let cards = StudyPackService::new(state.repo.clone())
        .list_flashcards(&claims.caller(), &study_pack_id)
        .await?;
    Ok(Json(cards))
}

pub async fn record_flashcard_session(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<FlashcardSessionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = StudyPackService::new(state.repo.clone())
        .record_flashcard_session(&claims.caller(), req)
        .await?;
    Ok(Json(FlashcardSessionResponse::from(session)))
}

pub async fn list_flashcard_sessions(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ServiceError> {
    let sessions = StudyPackService::new(state.repo.clone())
        .list_flashcard_sessions(&claims.caller())
        .await?;
    Ok(Json(
        sessions
            .into_iter()
            .map(FlashcardSessionResponse::from)
            .collect::<Vec<_>>(),
    ))
}
