use axum::http::StatusCode;
use serde_json::json;
use studypack_api::models::{
    AnswerKey, ProgressEventType, QuestionType, Quiz, QuizMetadata, QuizQuestion,
};
use uuid::Uuid;

mod common;

use common::{learner_token, send, teacher_token, COURSE_ID};

fn question(quiz_id: &str, position: i32, answer: &str) -> QuizQuestion {
    QuizQuestion {
        id: Uuid::new_v4().to_string(),
        quiz_id: quiz_id.to_string(),
        position,
        question_type: QuestionType::Mcq,
        prompt: format!("Question {}", position),
        options: vec!["A".to_string(), "B".to_string(), "C".to_string()],
        answer_key: AnswerKey::decode(&format!("\"{}\"", answer)),
        explanation: None,
    }
}

#[tokio::test]
async fn test_quiz_attempt_scores_and_records_progress() {
    let app = common::create_test_app().await;
    let (material_id, study_pack_id) = common::import_video(&app.router, false).await;
    common::wait_for_status(&app.router, &material_id, "READY").await;

    let quiz = Quiz::new(&study_pack_id, QuizMetadata::default());
    let quiz_id = quiz.id.clone();
    let questions = vec![
        question(&quiz_id, 1, "A"),
        question(&quiz_id, 2, "B"),
        question(&quiz_id, 3, "C"),
    ];
    let mut answers = serde_json::Map::new();
    answers.insert(questions[0].id.clone(), json!("A"));
    answers.insert(questions[1].id.clone(), json!("B"));
    // Case matters.
    answers.insert(questions[2].id.clone(), json!("c"));
    let answers = serde_json::Value::Object(answers);
    app.repo.insert_quiz(quiz, questions).await;

    let (status, json) = send(
        &app.router,
        "POST",
        "/api/v1/progress/quiz-attempts",
        Some(&learner_token()),
        Some(json!({ "quizId": quiz_id, "answers": answers })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "body: {}", json);
    assert_eq!(json["score"], 67);
    assert_eq!(json["quizId"], quiz_id);
    assert_eq!(json["userId"], "learner-1");
    assert!(json.get("_id").is_none());

    let attempts = app.repo.quiz_attempts().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].score, 67);

    let events = app.repo.progress_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ProgressEventType::QuizAttempt);
    assert_eq!(events[0].course_id, COURSE_ID);
    assert_eq!(events[0].user_id, "learner-1");
    let payload: serde_json::Value = serde_json::from_str(&events[0].payload).unwrap();
    assert_eq!(payload, answers);
}

#[tokio::test]
async fn test_generated_quiz_can_be_answered() {
    let app = common::create_test_app().await;
    let (material_id, _) = common::import_video(&app.router, false).await;
    common::wait_for_status(&app.router, &material_id, "READY").await;

    let (_, pack) = send(
        &app.router,
        "GET",
        &format!("/api/v1/study-packs/{}", material_id),
        Some(&teacher_token()),
        None,
    )
    .await;
    let question = &pack["quizzes"][0]["questions"][0];
    assert_eq!(question["answerKey"], "To solve a specific problem");
    assert!(question["explanation"].is_string());

    let mut answers = serde_json::Map::new();
    answers.insert(
        question["id"].as_str().unwrap().to_string(),
        json!("To solve a specific problem"),
    );

    let (status, json) = send(
        &app.router,
        "POST",
        "/api/v1/progress/quiz-attempts",
        Some(&learner_token()),
        Some(json!({ "quizId": pack["quizzes"][0]["id"], "answers": answers })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);
    assert_eq!(json["score"], 100);
}

#[tokio::test]
async fn test_draft_quiz_is_hidden_from_learners() {
    let app = common::create_test_app().await;
    let (material_id, _) = common::import_video(&app.router, true).await;
    common::wait_for_status(&app.router, &material_id, "GENERATED").await;

    let (_, pack) = send(
        &app.router,
        "GET",
        &format!("/api/v1/study-packs/{}", material_id),
        Some(&teacher_token()),
        None,
    )
    .await;
    let quiz_id = pack["quizzes"][0]["id"].clone();
    let question = &pack["quizzes"][0]["questions"][0];
    let mut answers = serde_json::Map::new();
    answers.insert(
        question["id"].as_str().unwrap().to_string(),
        question["answerKey"].clone(),
    );
    let body = json!({ "quizId": quiz_id, "answers": answers });

    let (status, json) = send(
        &app.router,
        "POST",
        "/api/v1/progress/quiz-attempts",
        Some(&learner_token()),
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "body: {}", json);
    assert_eq!(json["error"], "Quiz not found");
    assert!(app.repo.quiz_attempts().await.is_empty());
    assert!(app.repo.progress_events().await.is_empty());

    // Instructors may try the draft.
    let (status, json) = send(
        &app.router,
        "POST",
        "/api/v1/progress/quiz-attempts",
        Some(&teacher_token()),
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);
    assert_eq!(json["score"], 100);

    let (status, _) = send(
        &app.router,
        "POST",
        &format!("/api/v1/study-packs/{}/approve", material_id),
        Some(&teacher_token()),
        Some(json!({ "summary": "Approved", "keyPoints": ["K"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(
        &app.router,
        "POST",
        "/api/v1/progress/quiz-attempts",
        Some(&learner_token()),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);
    assert_eq!(json["userId"], "learner-1");
}

#[tokio::test]
async fn test_quiz_attempt_for_unknown_quiz_is_404() {
    let app = common::create_test_app().await;

    let (status, json) = send(
        &app.router,
        "POST",
        "/api/v1/progress/quiz-attempts",
        Some(&learner_token()),
        Some(json!({
            "quizId": "550e8400-e29b-41d4-a716-446655440000",
            "answers": {},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Quiz not found");
    assert!(app.repo.quiz_attempts().await.is_empty());
}

#[tokio::test]
async fn test_quiz_without_questions_scores_zero() {
    let app = common::create_test_app().await;
    let quiz = Quiz::new(&Uuid::new_v4().to_string(), QuizMetadata::default());
    let quiz_id = quiz.id.clone();
    app.repo.insert_quiz(quiz, Vec::new()).await;

    let (status, json) = send(
        &app.router,
        "POST",
        "/api/v1/progress/quiz-attempts",
        Some(&teacher_token()),
        Some(json!({ "quizId": quiz_id, "answers": { "anything": "A" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["score"], 0);

    // Orphan quiz: the course cannot be resolved.
    let events = app.repo.progress_events().await;
    assert_eq!(events[0].course_id, "");
}

#[tokio::test]
async fn test_flashcards_follow_learner_visibility() {
    let app = common::create_test_app().await;
    let (material_id, study_pack_id) = common::import_video(&app.router, true).await;
    common::wait_for_status(&app.router, &material_id, "GENERATED").await;
    let uri = format!("/api/v1/flashcards/{}", study_pack_id);

    let (status, cards) = send(&app.router, "GET", &uri, Some(&teacher_token()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cards.as_array().unwrap().len(), 1);
    assert_eq!(cards[0]["front"], "Define 'Abstraction'");

    let (status, _) = send(&app.router, "GET", &uri, Some(&learner_token()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        "POST",
        &format!("/api/v1/study-packs/{}/approve", material_id),
        Some(&teacher_token()),
        Some(json!({ "summary": "Approved", "keyPoints": ["K"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, cards) = send(&app.router, "GET", &uri, Some(&learner_token()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cards.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_flashcard_session_counts_responses() {
    let app = common::create_test_app().await;
    let (material_id, study_pack_id) = common::import_video(&app.router, false).await;
    common::wait_for_status(&app.router, &material_id, "READY").await;

    let (status, json) = send(
        &app.router,
        "POST",
        "/api/v1/progress/flashcard-sessions",
        Some(&learner_token()),
        Some(json!({
            "studyPackId": study_pack_id,
            "responses": { "c1": "known", "c2": "unknown", "c3": "known", "c4": "skipped" },
            "durationSec": 95,
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "body: {}", json);
    assert_eq!(json["knownCount"], 2);
    assert_eq!(json["unknownCount"], 2);
    assert_eq!(json["durationSec"], 95);
    assert_eq!(json["studyPackId"], study_pack_id);

    let events = app.repo.progress_events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ProgressEventType::FlashcardSession);
    assert_eq!(events[0].course_id, COURSE_ID);
}

#[tokio::test]
async fn test_flashcard_session_validation() {
    let app = common::create_test_app().await;
    let (material_id, study_pack_id) = common::import_video(&app.router, true).await;
    common::wait_for_status(&app.router, &material_id, "GENERATED").await;

    // Not yet published.
    let (status, _) = send(
        &app.router,
        "POST",
        "/api/v1/progress/flashcard-sessions",
        Some(&learner_token()),
        Some(json!({ "studyPackId": study_pack_id, "responses": {}, "durationSec": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/v1/progress/flashcard-sessions",
        Some(&teacher_token()),
        Some(json!({ "studyPackId": study_pack_id, "responses": {}, "durationSec": -1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/v1/progress/flashcard-sessions",
        Some(&teacher_token()),
        Some(json!({ "studyPackId": "nope", "responses": {}, "durationSec": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_flashcard_session_history_is_newest_first() {
    let app = common::create_test_app().await;
    let (material_id, study_pack_id) = common::import_video(&app.router, false).await;
    common::wait_for_status(&app.router, &material_id, "READY").await;

    for (token, duration) in [
        (learner_token(), 1),
        (learner_token(), 2),
        (teacher_token(), 99),
        (learner_token(), 3),
    ] {
        let (status, _) = send(
            &app.router,
            "POST",
            "/api/v1/progress/flashcard-sessions",
            Some(&token),
            Some(json!({
                "studyPackId": study_pack_id,
                "responses": { "c1": "known" },
                "durationSec": duration,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = send(
        &app.router,
        "GET",
        "/api/v1/progress/flashcard-sessions",
        Some(&learner_token()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);
    let durations: Vec<i64> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["durationSec"].as_i64().unwrap())
        .collect();
    assert_eq!(durations, vec![3, 2, 1]);
    assert!(json
        .as_array()
        .unwrap()
        .iter()
        .all(|s| s["userId"] == "learner-1"));

    let (status, _) = send(
        &app.router,
        "GET",
        "/api/v1/progress/flashcard-sessions",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_flashcard_session_history_is_capped_at_twenty() {
    let app = common::create_test_app().await;
    let (material_id, study_pack_id) = common::import_video(&app.router, false).await;
    common::wait_for_status(&app.router, &material_id, "READY").await;

    for duration in 1..=22 {
        let (status, _) = send(
            &app.router,
            "POST",
            "/api/v1/progress/flashcard-sessions",
            Some(&learner_token()),
            Some(json!({
                "studyPackId": study_pack_id,
                "responses": {},
                "durationSec": duration,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, json) = send(
        &app.router,
        "GET",
        "/api/v1/progress/flashcard-sessions",
        Some(&learner_token()),
        None,
    )
    .await;
    let sessions = json.as_array().unwrap();
    assert_eq!(sessions.len(), 20);
    assert_eq!(sessions[0]["durationSec"], 22);
    assert_eq!(sessions[19]["durationSec"], 3);
}
