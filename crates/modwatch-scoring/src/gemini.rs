//! Gemini `generateContent` client with structured JSON output.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{normalise_base, status_error, ScoringError};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/";

/// Sampling parameters sent with every request.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub top_p: f64,
    pub top_k: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-lite".to_string(),
            temperature: 0.7,
            max_output_tokens: 500,
            top_p: 0.95,
            top_k: 40,
        }
    }
}

/// Parsed model output plus token accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct GeminiResponse {
    pub value: Value,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u64>,
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: Url,
    settings: GenerationSettings,
}

impl GeminiClient {
    /// # Errors
    ///
    /// Returns [`ScoringError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(
        api_key: &str,
        settings: GenerationSettings,
        timeout_secs: u64,
    ) -> Result<Self, ScoringError> {
        Self::with_base_url(api_key, settings, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::Http`] if the `reqwest::Client` cannot be
    /// built, or [`ScoringError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        api_key: &str,
        settings: GenerationSettings,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, ScoringError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url: normalise_base(base_url)?,
            settings,
        })
    }

    /// Generates a response constrained to `response_schema` and parses the
    /// candidate text as JSON.
    ///
    /// # Errors
    ///
    /// - [`ScoringError::RateLimited`] on HTTP 429.
    /// - [`ScoringError::BadRequest`] on HTTP 400.
    /// - [`ScoringError::Deserialize`] if the envelope or the candidate text
    ///   is not valid JSON.
    pub async fn generate_structured(
        &self,
        prompt: &str,
        system_instruction: &str,
        response_schema: &Value,
    ) -> Result<GeminiResponse, ScoringError> {
        let endpoint = format!("v1beta/models/{}:generateContent", self.settings.model);
        let mut url = self
            .base_url
            .join(&endpoint)
            .map_err(|e| ScoringError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            })?;
        url.query_pairs_mut().append_pair("key", &self.api_key);

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "systemInstruction": { "parts": [{ "text": system_instruction }] },
            "generationConfig": {
                "temperature": self.settings.temperature,
                "maxOutputTokens": self.settings.max_output_tokens,
                "topP": self.settings.top_p,
                "topK": self.settings.top_k,
                "responseMimeType": "application/json",
                "responseSchema": response_schema,
            },
        });

        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        let text_body = response.text().await?;
        if !status.is_success() {
            return Err(status_error(status, &text_body, "gemini"));
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&text_body).map_err(|e| ScoringError::Deserialize {
                context: "generateContent".to_string(),
                source: e,
            })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text)
                    .collect()
            })
            .unwrap_or_default();

        let value = serde_json::from_str(&text).map_err(|e| ScoringError::Deserialize {
            context: "generateContent candidate text".to_string(),
            source: e,
        })?;

        let total_tokens = parsed.usage_metadata.and_then(|u| u.total_token_count);
        tracing::debug!(
            model = %self.settings.model,
            prompt_chars = prompt.chars().count(),
            total_tokens,
            "structured generation complete"
        );
        Ok(GeminiResponse {
            value,
            total_tokens,
        })
    }
}
