use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TutorChatRequest {
    #[validate(length(min = 1, message = "courseId is required"))]
    pub course_id: String,
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorChatResponse {
    pub answer: String,
    pub source_references: Vec<String>,
    pub analyzed_materials_count: u32,
    pub provider: String,
    pub model: String,
}
