#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use studypack_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::UserRole,
    repository::InMemoryRepository,
    services::{
        content_generator::TemplateSummarizer, gemini_client::TextGenerator,
        material_lock::LocalMaterialLocks, AppState,
    },
};
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "integration-test-secret";
pub const COURSE_ID: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";
pub const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
}

/// Text generator that returns a canned reply, or fails when `reply` is `None`.
pub struct StubTextGenerator {
    pub reply: Option<String>,
}

#[async_trait]
impl TextGenerator for StubTextGenerator {
    fn provider(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-model"
    }

    async fn generate(&self, _prompt: &str, _timeout: Duration) -> Result<String> {
        self.reply
            .clone()
            .ok_or_else(|| anyhow!("upstream unavailable"))
    }
}

pub fn test_config() -> Config {
    Config {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        generation_timeout_secs: 5,
        generation_workers: 2,
        generation_queue_capacity: 16,
        ..Config::default()
    }
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with_tutor(Some("Hello! Let's dive in. The answer is 4.".to_string())).await
}

/// `None` leaves the tutor unconfigured.
pub async fn create_test_app_with_tutor(tutor_reply: Option<String>) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let repo = Arc::new(InMemoryRepository::new());
    let text_generator: Option<Arc<dyn TextGenerator>> = tutor_reply.map(|reply| {
        Arc::new(StubTextGenerator { reply: Some(reply) }) as Arc<dyn TextGenerator>
    });

    let app_state = Arc::new(AppState::from_parts(
        test_config(),
        repo.clone(),
        Arc::new(LocalMaterialLocks::new()),
        Arc::new(TemplateSummarizer),
        text_generator,
    ));

    TestApp {
        router: create_router(app_state),
        repo,
    }
}

pub fn token_for(user_id: &str, role: UserRole) -> String {
    JwtService::new(TEST_JWT_SECRET)
        .generate_token(JwtClaims::new(user_id, role, 3600))
        .expect("token")
}

pub fn teacher_token() -> String {
    token_for("teacher-1", UserRole::Teacher)
}

pub fn learner_token() -> String {
    token_for("learner-1", UserRole::Learner)
}

/// Sends a request and returns the status with the parsed JSON body (`Null` when empty).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            panic!(
                "non-JSON body for {} {}: {}",
                method,
                uri,
                String::from_utf8_lossy(&bytes)
            )
        })
    };
    (status, json)
}

/// Imports a video with a transcript and returns (materialId, studyPackId).
pub async fn import_video(app: &Router, requires_approval: bool) -> (String, String) {
    let (status, json) = send(
        app,
        "POST",
        "/api/v1/imports/youtube",
        Some(&teacher_token()),
        Some(serde_json::json!({
            "courseId": COURSE_ID,
            "youtubeUrl": VIDEO_URL,
            "transcript": "Rust ownership moves values. Borrowing lends them. Lifetimes bound references. Extra detail.",
            "requiresApproval": requires_approval,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "import failed: {}", json);

    let material_id = json["material"]["id"].as_str().unwrap().to_string();
    let study_pack_id = json["studyPack"]["id"].as_str().unwrap().to_string();
    (material_id, study_pack_id)
}

/// Polls the import status until it reports `expected`.
pub async fn wait_for_status(app: &Router, material_id: &str, expected: &str) -> Value {
    let uri = format!("/api/v1/imports/{}/status", material_id);
    let mut last = Value::Null;
    for _ in 0..100 {
        let (status, json) = send(app, "GET", &uri, Some(&teacher_token()), None).await;
        assert_eq!(status, StatusCode::OK, "status poll failed: {}", json);
        if json["status"] == expected {
            return json;
        }
        last = json;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("material {} never reached {}: {}", material_id, expected, last);
}
