use axum::{
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::ServiceError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::study_pack::{
        ApproveStudyPackRequest, DraftResponse, RegenerateStudyPackRequest, ReviewActionResponse,
    },
    services::{
        review_service::{ReviewService, APPROVED_MESSAGE, REGENERATED_MESSAGE},
        study_pack_service::StudyPackService,
        AppState,
    },
};

fn review_service(state: &AppState) -> ReviewService {
    ReviewService::new(state.repo.clone(), state.locks.clone())
}

pub async fn get_study_pack(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(material_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = StudyPackService::new(state.repo.clone())
        .get_study_pack(&claims.caller(), &material_id)
        .await?;
    Ok(Json(view))
}

pub async fn get_review_draft(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(material_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let draft = review_service(&state)
        .get_review_draft(&claims.caller(), &material_id)
        .await?;
    Ok(Json(DraftResponse { draft }))
}

pub async fn approve_study_pack(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(material_id): Path<String>,
    AppJson(req): AppJson<ApproveStudyPackRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    tracing::info!(user_id = %claims.sub, material_id = %material_id, "Approving study pack");

    let draft = review_service(&state)
        .approve_study_pack(&claims.caller(), &material_id, req)
        .await?;
    Ok(Json(ReviewActionResponse {
        message: APPROVED_MESSAGE.to_string(),
        draft,
    }))
}

/// The body is optional: an empty request regenerates without notes.
pub async fn regenerate_study_pack(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(material_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    tracing::info!(user_id = %claims.sub, material_id = %material_id, "Regenerating study pack");

    let req = if body.iter().all(u8::is_ascii_whitespace) {
        RegenerateStudyPackRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ServiceError::invalid(format!("Failed to parse JSON request body: {}", e))
        })?
    };

    let draft = review_service(&state)
        .regenerate_study_pack(&claims.caller(), &material_id, req)
        .await?;
    Ok(Json(ReviewActionResponse {
        message: REGENERATED_MESSAGE.to_string(),
        draft,
    }))
}
