use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::bson_datetime_as_chrono;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizMetadata {
    pub difficulty: String,
}

impl Default for QuizMetadata {
    fn default() -> Self {
        Self {
            difficulty: "Adaptive".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    #[serde(rename = "_id")]
    pub id: String,
    pub study_pack_id: String,
    pub version: i32,
    #[serde(default)]
    pub metadata: QuizMetadata,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl Quiz {
    pub fn new(study_pack_id: &str, metadata: QuizMetadata) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            study_pack_id: study_pack_id.to_string(),
            version: 1,
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    Mcq,
}

/// Canonical correct value of a question.
///
/// Stored as a JSON-quoted string (`"\"Paris\""`); legacy rows may hold the bare
/// value. Both forms decode to the plain text, and the stored form is always
/// written quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerKey(String);

impl AnswerKey {
    pub fn new(value: impl Into<String>) -> Self {
        AnswerKey(value.into())
    }

    pub fn decode(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('"') {
            if let Ok(value) = serde_json::from_str::<String>(trimmed) {
                return AnswerKey(value);
            }
        }
        AnswerKey(raw.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact, case-sensitive comparison.
    pub fn matches(&self, submitted: &str) -> bool {
        self.0 == submitted
    }

    pub fn to_stored(&self) -> String {
        serde_json::Value::String(self.0.clone()).to_string()
    }
}

impl Serialize for AnswerKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_stored())
    }
}

impl<'de> Deserialize<'de> for AnswerKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(AnswerKey::decode(&raw))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    #[serde(rename = "_id")]
    pub id: String,
    pub quiz_id: String,
    pub position: i32,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub prompt: String,
    pub options: Vec<String>,
    pub answer_key: AnswerKey,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    #[serde(rename = "_id")]
    pub id: String,
    pub study_pack_id: String,
    pub position: i32,
    pub front: String,
    pub back: String,
}
