use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::bson_datetime_as_chrono;
use super::study_pack::StudyPackStatus;
use crate::utils::video_url;

/// Title and sort order of the module that collects imports without an explicit target.
pub const RESOURCES_MODULE_TITLE: &str = "Resources";
pub const RESOURCES_MODULE_ORDER: i32 = 999;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaterialType {
    Video,
    Doc,
    Pdf,
}

impl MaterialType {
    pub fn as_str(&self) -> &str {
        match self {
            MaterialType::Video => "VIDEO",
            MaterialType::Doc => "DOC",
            MaterialType::Pdf => "PDF",
        }
    }

    /// PDF iff the URL ends in `.pdf` (any case), DOC otherwise.
    pub fn from_file_url(url: &str) -> Self {
        if url.to_ascii_lowercase().ends_with(".pdf") {
            MaterialType::Pdf
        } else {
            MaterialType::Doc
        }
    }
}

/// Course module ("container") a material is attached to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    #[serde(rename = "_id")]
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub order: i32,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl Module {
    pub fn new(course_id: &str, title: &str, order: i32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            course_id: course_id.to_string(),
            title: title.to_string(),
            order,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    #[serde(rename = "_id")]
    pub id: String,
    pub module_id: String,
    #[serde(rename = "type")]
    pub material_type: MaterialType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_text: Option<String>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
}

impl Material {
    pub fn video(module_id: &str, source_url: &str, transcript: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            module_id: module_id.to_string(),
            material_type: MaterialType::Video,
            title: "YouTube Import".to_string(),
            source_url: Some(source_url.to_string()),
            file_url: None,
            transcript_text: transcript,
            created_at: Utc::now(),
        }
    }

    pub fn document(module_id: &str, file_url: &str, title: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            module_id: module_id.to_string(),
            material_type: MaterialType::from_file_url(file_url),
            title: title.to_string(),
            source_url: None,
            file_url: Some(file_url.to_string()),
            transcript_text: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImportVideoRequest {
    #[validate(length(min = 1, message = "courseId is required"))]
    pub course_id: String,
    #[serde(default)]
    pub module_id: Option<String>,
    #[validate(length(min = 1, message = "youtubeUrl is required"))]
    pub youtube_url: String,
    #[serde(default)]
    pub transcript: Option<String>,
    /// Hold the generated pack as a draft until an instructor approves it.
    #[serde(default)]
    pub requires_approval: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImportDocumentRequest {
    #[validate(length(min = 1, message = "courseId is required"))]
    pub course_id: String,
    #[serde(default)]
    pub module_id: Option<String>,
    #[validate(length(min = 1, message = "fileUrl is required"))]
    pub file_url: String,
    #[validate(length(min = 1, message = "title is required"))]
    pub title: String,
    #[serde(default)]
    pub requires_approval: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AttachTranscriptRequest {
    #[validate(length(min = 1, message = "transcript is required"))]
    pub transcript: String,
}

/// Material as returned by the API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialResponse {
    pub id: String,
    pub module_id: String,
    #[serde(rename = "type")]
    pub material_type: MaterialType,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Material> for MaterialResponse {
    fn from(material: Material) -> Self {
        let video_id = material
            .source_url
            .as_deref()
            .and_then(video_url::extract_video_id);
        MaterialResponse {
            id: material.id,
            module_id: material.module_id,
            material_type: material.material_type,
            title: material.title,
            source_url: material.source_url,
            video_id,
            file_url: material.file_url,
            transcript_text: material.transcript_text,
            created_at: material.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudyPackRef {
    pub id: String,
    pub status: StudyPackStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub material: MaterialResponse,
    pub study_pack: StudyPackRef,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStatusResponse {
    pub status: StudyPackStatus,
    pub study_pack_id: String,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
