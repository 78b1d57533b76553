use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::ServiceError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::material::{AttachTranscriptRequest, ImportDocumentRequest, ImportVideoRequest},
    services::{ingestion_service::IngestionService, AppState},
};

fn ingestion_service(state: &AppState) -> IngestionService {
    IngestionService::new(
        state.repo.clone(),
        state.locks.clone(),
        state.generation_queue.clone(),
    )
}

pub async fn import_youtube(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<ImportVideoRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    tracing::info!(user_id = %claims.sub, course_id = %req.course_id, "Importing YouTube video");

    let response = ingestion_service(&state)
        .import_video(&claims.caller(), req)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn import_document(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<ImportDocumentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    tracing::info!(user_id = %claims.sub, course_id = %req.course_id, "Importing document");

    let response = ingestion_service(&state)
        .import_document(&claims.caller(), req)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_import_status(
    State(state): State<Arc<AppState>>,
    Path(material_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = ingestion_service(&state)
        .get_import_status(&material_id)
        .await?;
    Ok(Json(status))
}

pub async fn attach_transcript(
    State(state): State<Arc<AppState>>,
    Path(material_id): Path<String>,
    AppJson(req): AppJson<AttachTranscriptRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    tracing::info!(material_id = %material_id, "Transcript received");

    let status = ingestion_service(&state)
        .attach_transcript(&material_id, req)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(status)))
}
