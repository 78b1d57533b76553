use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use validator::Validate;

use super::gemini_client::TextGenerator;
use crate::error::{ServiceError, ServiceResult};
use crate::metrics::TUTOR_REQUESTS_TOTAL;
use crate::models::tutor::{TutorChatRequest, TutorChatResponse};

const MAX_SANITIZE_PASSES: usize = 4;

lazy_static! {
    static ref LEAD_IN_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?is)^\s*(hello|hi|hey|greetings)\b[^\n]{0,140}ai\s*tutor[^\n.!?]*[.!?]\s*")
            .expect("tutor greeting pattern"),
        Regex::new(r"(?is)^\s*(hello|hi|hey|greetings)\b[^\n.!?]*[.!?]\s*")
            .expect("greeting pattern"),
        Regex::new(
            r"(?is)^\s*(let'?s|lets)\s+(dive\s+in|dive\s+into|get\s+started|jump\s+in)[^\n.!?]*[.!?]\s*"
        )
        .expect("filler pattern"),
    ];
}

/// Single-turn course tutor on top of a text generator.
pub struct TutorService {
    generator: Option<Arc<dyn TextGenerator>>,
    timeout: Duration,
}

impl TutorService {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub async fn answer(&self, req: TutorChatRequest) -> ServiceResult<TutorChatResponse> {
        req.validate()?;
        let query = req.query.trim();
        if query.is_empty() {
            return Err(ServiceError::invalid("query is required"));
        }

        let Some(generator) = self.generator.as_ref() else {
            TUTOR_REQUESTS_TOTAL.with_label_values(&["unconfigured"]).inc();
            return Err(ServiceError::ServiceUnavailable(
                "Tutor model is not configured".to_string(),
            ));
        };

        let prompt = build_prompt(req.course_id.trim(), query);
        let raw = match generator.generate(&prompt, self.timeout).await {
            Ok(raw) => raw,
            Err(err) => {
                TUTOR_REQUESTS_TOTAL.with_label_values(&["upstream_error"]).inc();
                tracing::warn!(error = %format!("{:#}", err), "Tutor generation failed");
                return Err(ServiceError::UpstreamError(
                    "Tutor model request failed".to_string(),
                ));
            }
        };

        let answer = sanitize_answer(&raw);
        if answer.is_empty() {
            TUTOR_REQUESTS_TOTAL.with_label_values(&["upstream_error"]).inc();
            return Err(ServiceError::UpstreamError(
                "Tutor model returned an empty answer".to_string(),
            ));
        }

        TUTOR_REQUESTS_TOTAL.with_label_values(&["success"]).inc();
        Ok(TutorChatResponse {
            answer,
            source_references: Vec::new(),
            analyzed_materials_count: 1,
            provider: generator.provider().to_string(),
            model: generator.model().to_string(),
        })
    }
}

fn build_prompt(course_id: &str, query: &str) -> String {
    format!(
        "You are MyWay AI Tutor.

Rules:
- Explain clearly and practically.
- Use short paragraphs and bullet points when useful.
- If user asks for differences/comparisons, provide a side-by-side style explanation.
- If user asks for steps, give numbered steps.
- Do NOT start responses with greetings (no \"Hi\", \"Hello\", \"Hey\", \"Great question\", or similar openers).
- Start directly with the answer.
- Keep tone professional, concise, and natural.
- End with one concise check-for-understanding question.

Course context: {}
User question: {}",
        course_id, query
    )
}

/// Strips greeting and filler lead-ins, repeating until nothing changes (at
/// most four passes). Never turns non-empty model output into an empty answer.
pub fn sanitize_answer(input: &str) -> String {
    let text = input.trim();
    if text.is_empty() {
        return String::new();
    }

    let mut cleaned = text.to_string();
    for _ in 0..MAX_SANITIZE_PASSES {
        let before = cleaned.clone();
        for pattern in LEAD_IN_PATTERNS.iter() {
            cleaned = pattern.replace(&cleaned, "").trim().to_string();
        }
        if cleaned == before {
            break;
        }
    }

    if cleaned.is_empty() {
        text.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedGenerator(Result<String, String>);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        fn provider(&self) -> &str {
            "gemini"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        async fn generate(&self, _prompt: &str, _timeout: Duration) -> anyhow::Result<String> {
            self.0.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn request(query: &str) -> TutorChatRequest {
        TutorChatRequest {
            course_id: "course-1".to_string(),
            query: query.to_string(),
        }
    }

    #[test]
    fn strips_greeting_and_filler() {
        assert_eq!(
            sanitize_answer("Hello! Let's dive in. The answer is 4."),
            "The answer is 4."
        );
        assert_eq!(
            sanitize_answer("Hi there, I'm your AI tutor. Hey! Photosynthesis uses light."),
            "Photosynthesis uses light."
        );
    }

    #[test]
    fn greeting_only_returns_original() {
        assert_eq!(sanitize_answer("  Hello there!  "), "Hello there!");
    }

    #[test]
    fn words_starting_with_greetings_are_kept() {
        assert_eq!(
            sanitize_answer("History matters. Dates too."),
            "History matters. Dates too."
        );
        assert_eq!(sanitize_answer("Plain answer."), "Plain answer.");
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let service = TutorService::new(None, Duration::from_secs(1));
        let err = service.answer(request("   ")).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn missing_generator_is_unavailable() {
        let service = TutorService::new(None, Duration::from_secs(1));
        let err = service.answer(request("What is 2+2?")).await.unwrap_err();
        assert!(matches!(err, ServiceError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn upstream_failure_maps_to_upstream_error() {
        let service = TutorService::new(
            Some(Arc::new(FixedGenerator(Err("boom".to_string())))),
            Duration::from_secs(1),
        );
        let err = service.answer(request("What is 2+2?")).await.unwrap_err();
        assert!(matches!(err, ServiceError::UpstreamError(_)));
    }

    #[tokio::test]
    async fn answer_is_sanitized_and_described() {
        let service = TutorService::new(
            Some(Arc::new(FixedGenerator(Ok(
                "Hey! Let's get started. 2 + 2 = 4.".to_string()
            )))),
            Duration::from_secs(1),
        );
        let response = service.answer(request("What is 2+2?")).await.unwrap();
        assert_eq!(response.answer, "2 + 2 = 4.");
        assert!(response.source_references.is_empty());
        assert_eq!(response.analyzed_materials_count, 1);
        assert_eq!(response.provider, "gemini");
        assert_eq!(response.model, "test-model");
    }
}
