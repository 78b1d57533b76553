use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Single-prompt text generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    /// Generated text, or an error when the call fails or yields nothing usable.
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateContentResponse {
    /// First non-blank text part across all candidates.
    fn first_text(&self) -> Option<String> {
        self.candidates
            .iter()
            .flat_map(|c| c.content.parts.iter())
            .map(|p| p.text.trim())
            .find(|t| !t.is_empty())
            .map(str::to_string)
    }
}

pub struct GeminiClient {
    http_client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http_client: Client::new(),
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn provider(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String> {
        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        let body = GenerateContentRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.4,
                max_output_tokens: 900,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .context("Failed to call Gemini API")?;

        if !response.status().is_success() {
            bail!("Gemini API returned status: {}", response.status());
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to decode Gemini response")?;

        parsed
            .first_text()
            .ok_or_else(|| anyhow!("Empty response from Gemini"))
    }
}
