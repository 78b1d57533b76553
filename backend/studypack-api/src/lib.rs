use axum::{
    http::{header, Method, Request},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod repository;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        // Protected endpoints (require JWT)
        .nest(
            "/api/v1",
            api_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    trace_id = tracing::field::Empty,
                )
            }),
        )
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Ingestion
        .route("/imports/youtube", post(handlers::imports::import_youtube))
        .route("/imports/document", post(handlers::imports::import_document))
        .route(
            "/imports/{material_id}/status",
            get(handlers::imports::get_import_status),
        )
        .route(
            "/imports/{material_id}/transcript",
            post(handlers::imports::attach_transcript),
        )
        // Study packs and review
        .route(
            "/study-packs/{material_id}",
            get(handlers::study_packs::get_study_pack),
        )
        .route(
            "/study-packs/{material_id}/review",
            get(handlers::study_packs::get_review_draft),
        )
        .route(
            "/study-packs/{material_id}/approve",
            post(handlers::study_packs::approve_study_pack),
        )
        .route(
            "/study-packs/{material_id}/regenerate",
            post(handlers::study_packs::regenerate_study_pack),
        )
        // Learner practice
        .route(
            "/flashcards/{study_pack_id}",
            get(handlers::progress::list_flashcards),
        )
        .route(
            "/progress/quiz-attempts",
            post(handlers::progress::record_quiz_attempt),
        )
        .route(
            "/progress/flashcard-sessions",
            post(handlers::progress::record_flashcard_session)
                .get(handlers::progress::list_flashcard_sessions),
        )
        // Tutor
        .route("/ai/tutor/chat", post(handlers::tutor::tutor_chat))
}
