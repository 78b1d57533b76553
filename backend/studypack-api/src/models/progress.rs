use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::bson_datetime_as_chrono;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    #[serde(rename = "_id")]
    pub id: String,
    pub quiz_id: String,
    pub user_id: String,
    /// Percentage of correct answers, 0..=100.
    pub score: i32,
    /// Submitted answers exactly as received (question id -> value).
    pub answers: BTreeMap<String, String>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardSession {
    #[serde(rename = "_id")]
    pub id: String,
    pub study_pack_id: String,
    pub user_id: String,
    pub known_count: i32,
    pub unknown_count: i32,
    pub duration_sec: i32,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressEventType {
    QuizAttempt,
    FlashcardSession,
}

/// Append-only learner activity record consumed by analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    /// Empty when the course could not be resolved.
    pub course_id: String,
    pub event_type: ProgressEventType,
    pub payload: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        user_id: &str,
        course_id: Option<String>,
        event_type: ProgressEventType,
        payload: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            course_id: course_id.unwrap_or_default(),
            event_type,
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Quiz attempt as returned by the API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttemptResponse {
    pub id: String,
    pub quiz_id: String,
    pub user_id: String,
    pub score: i32,
    pub answers: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl From<QuizAttempt> for QuizAttemptResponse {
    fn from(attempt: QuizAttempt) -> Self {
        QuizAttemptResponse {
            id: attempt.id,
            quiz_id: attempt.quiz_id,
            user_id: attempt.user_id,
            score: attempt.score,
            answers: attempt.answers,
            created_at: attempt.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardSessionResponse {
    pub id: String,
    pub study_pack_id: String,
    pub user_id: String,
    pub known_count: i32,
    pub unknown_count: i32,
    pub duration_sec: i32,
    pub created_at: DateTime<Utc>,
}

impl From<FlashcardSession> for FlashcardSessionResponse {
    fn from(session: FlashcardSession) -> Self {
        FlashcardSessionResponse {
            id: session.id,
            study_pack_id: session.study_pack_id,
            user_id: session.user_id,
            known_count: session.known_count,
            unknown_count: session.unknown_count,
            duration_sec: session.duration_sec,
            created_at: session.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordQuizAttemptRequest {
    #[validate(length(min = 1, message = "quizId is required"))]
    pub quiz_id: String,
    pub answers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardSessionRequest {
    #[validate(length(min = 1, message = "studyPackId is required"))]
    pub study_pack_id: String,
    /// flashcard id -> "known" | "unknown"
    pub responses: BTreeMap<String, String>,
    #[validate(range(min = 0, message = "durationSec must not be negative"))]
    pub duration_sec: i32,
}
