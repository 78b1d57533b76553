use axum::{extract::State, response::IntoResponse, Extension, Json};
use std::sync::Arc;

use crate::{
    error::ServiceError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::tutor::TutorChatRequest,
    services::{tutor_service::TutorService, AppState},
};

pub async fn tutor_chat(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<TutorChatRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    tracing::debug!(user_id = %claims.sub, course_id = %req.course_id, "Tutor chat request");

    let response = TutorService::new(state.text_generator.clone(), state.tutor_timeout())
        .answer(req)
        .await?;
    Ok(Json(response))
}
