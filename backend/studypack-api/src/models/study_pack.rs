use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::material::MaterialResponse;
use super::quiz::{QuestionType, QuizMetadata};
use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

pub const NO_SUMMARY_PLACEHOLDER: &str = "No summary generated yet.";
pub const NO_KEY_POINTS_PLACEHOLDER: &str = "No key points generated yet.";

/// Lifecycle of a study pack.
///
/// `Queued` waits for a transcript, `Processing` is generating, `Generated` is a
/// draft awaiting instructor review and `Ready` is published to learners.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StudyPackStatus {
    Queued,
    Processing,
    Generated,
    Ready,
}

impl StudyPackStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StudyPackStatus::Queued => "QUEUED",
            StudyPackStatus::Processing => "PROCESSING",
            StudyPackStatus::Generated => "GENERATED",
            StudyPackStatus::Ready => "READY",
        }
    }

    /// Forward-only transitions. Approval may publish from any state and
    /// regeneration may open a fresh draft from any state.
    pub fn can_advance_to(&self, next: StudyPackStatus) -> bool {
        use StudyPackStatus::{Generated, Processing, Queued, Ready};
        matches!(
            (*self, next),
            (Queued, Processing) | (_, Ready) | (_, Generated)
        )
    }
}

impl std::fmt::Display for StudyPackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyPack {
    #[serde(rename = "_id")]
    pub id: String,
    pub material_id: String,
    pub created_by: String,
    pub status: StudyPackStatus,
    pub requires_approval: bool,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default, with = "bson_datetime_as_chrono_option")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    /// Outcome of the last failed generation run, cleared on success.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl StudyPack {
    pub fn new(
        material_id: &str,
        created_by: &str,
        status: StudyPackStatus,
        requires_approval: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            material_id: material_id.to_string(),
            created_by: created_by.to_string(),
            status,
            requires_approval,
            approved_by: None,
            published_at: None,
            created_at: Utc::now(),
            last_error: None,
        }
    }

    /// Learners only ever see published packs.
    pub fn is_visible_to_learners(&self) -> bool {
        self.status == StudyPackStatus::Ready
    }
}

/// Versioned summary payload. Decoded once by the repository; readers never see
/// raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "version")]
pub enum SummaryContent {
    #[serde(rename = "1", rename_all = "camelCase")]
    V1 {
        summary_text: String,
        bullets: Vec<String>,
    },
}

impl SummaryContent {
    pub fn new(summary_text: impl Into<String>, bullets: Vec<String>) -> Self {
        SummaryContent::V1 {
            summary_text: summary_text.into(),
            bullets,
        }
    }

    pub fn summary_text(&self) -> &str {
        match self {
            SummaryContent::V1 { summary_text, .. } => summary_text,
        }
    }

    pub fn bullets(&self) -> &[String] {
        match self {
            SummaryContent::V1 { bullets, .. } => bullets,
        }
    }

    /// Summary text and key points for display, falling back to placeholders
    /// when nothing usable was generated.
    pub fn display_parts(summary: Option<&SummaryContent>) -> (String, Vec<String>) {
        let Some(content) = summary else {
            return (
                NO_SUMMARY_PLACEHOLDER.to_string(),
                vec![NO_KEY_POINTS_PLACEHOLDER.to_string()],
            );
        };

        let text = content.summary_text().trim();
        let text = if text.is_empty() {
            NO_SUMMARY_PLACEHOLDER.to_string()
        } else {
            text.to_string()
        };

        let mut points = content
            .bullets()
            .iter()
            .map(|point| point.trim())
            .filter(|point| !point.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        if points.is_empty() {
            points.push(NO_KEY_POINTS_PLACEHOLDER.to_string());
        }

        (text, points)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    #[serde(rename = "_id")]
    pub id: String,
    pub study_pack_id: String,
    pub content: SummaryContent,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl Summary {
    pub fn new(study_pack_id: &str, content: SummaryContent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            study_pack_id: study_pack_id.to_string(),
            content,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveStudyPackRequest {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub key_points_text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegenerateStudyPackRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDraft {
    pub material_id: String,
    pub study_pack_id: String,
    pub status: StudyPackStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub summary: String,
    pub key_points: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DraftResponse {
    pub draft: ReviewDraft,
}

#[derive(Debug, Serialize)]
pub struct ReviewActionResponse {
    pub message: String,
    pub draft: ReviewDraft,
}

/// Full study pack as shown on the study page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyPackView {
    pub id: String,
    pub material_id: String,
    pub status: StudyPackStatus,
    pub requires_approval: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<SummaryView>,
    pub quizzes: Vec<QuizView>,
    pub flashcards: Vec<FlashcardView>,
    pub material: MaterialResponse,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryView {
    pub summary_text: String,
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizView {
    pub id: String,
    pub version: i32,
    pub metadata: QuizMetadata,
    pub questions: Vec<QuestionView>,
}

/// `answer_key` and `explanation` are omitted for learners.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub prompt: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlashcardView {
    pub id: String,
    pub front: String,
    pub back: String,
}
