//! Perspective `comments:analyze` client.

use std::collections::BTreeMap;
use std::time::Duration;

use modwatch_core::{AttributeScore, FlatScores};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{normalise_base, status_error, ScoringError};

const DEFAULT_BASE_URL: &str = "https://commentanalyzer.googleapis.com/";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    #[serde(default)]
    attribute_scores: BTreeMap<String, AttributeResult>,
    #[serde(default)]
    languages: Vec<String>,
    #[serde(default)]
    detected_languages: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttributeResult {
    summary_score: ScoreValue,
    #[serde(default)]
    span_scores: Vec<SpanScore>,
}

#[derive(Debug, Deserialize)]
struct ScoreValue {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct SpanScore {
    begin: Option<u64>,
    end: Option<u64>,
    score: ScoreValue,
}

/// Client for the Perspective toxicity classifier.
pub struct PerspectiveClient {
    client: Client,
    api_key: String,
    base_url: Url,
    attributes: Vec<String>,
}

impl PerspectiveClient {
    /// Creates a client pointed at the production endpoint, requesting
    /// `attributes` (e.g. `TOXICITY`) on every call.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(
        api_key: &str,
        attributes: Vec<String>,
        timeout_secs: u64,
    ) -> Result<Self, ScoringError> {
        Self::with_base_url(api_key, attributes, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::Http`] if the `reqwest::Client` cannot be
    /// built, or [`ScoringError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        api_key: &str,
        attributes: Vec<String>,
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
            attributes,
        })
    }

    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Scores `text`. `Ok(None)` when the service returns no attribute scores.
    ///
    /// # Errors
    ///
    /// - [`ScoringError::RateLimited`] on HTTP 429.
    /// - [`ScoringError::BadRequest`] on HTTP 400, e.g. unsupported language.
    /// - [`ScoringError::Deserialize`] if the body does not parse.
    pub async fn analyze(&self, text: &str) -> Result<Option<FlatScores>, ScoringError> {
        let mut url = self
            .base_url
            .join("v1alpha1/comments:analyze")
            .map_err(|e| ScoringError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            })?;
        url.query_pairs_mut().append_pair("key", &self.api_key);

        let requested: Map<String, Value> = self
            .attributes
            .iter()
            .map(|a| (a.clone(), json!({})))
            .collect();
        let body = json!({
            "comment": { "text": text },
            "spanAnnotations": true,
            "requestedAttributes": requested,
        });

        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        let text_body = response.text().await?;
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), text_len = text.len(), "analyze request failed");
            return Err(status_error(status, &text_body, "perspective"));
        }

        let parsed: AnalyzeResponse =
            serde_json::from_str(&text_body).map_err(|e| ScoringError::Deserialize {
                context: "comments:analyze".to_string(),
                source: e,
            })?;
        Ok(flatten(parsed))
    }
}

/// Per attribute, keeps the summary score and the bounds of the highest
/// scoring span.
fn flatten(response: AnalyzeResponse) -> Option<FlatScores> {
    if response.attribute_scores.is_empty() {
        return None;
    }
    let attributes = response
        .attribute_scores
        .into_iter()
        .map(|(name, result)| {
            let top_span = result
                .span_scores
                .iter()
                .max_by(|a, b| a.score.value.total_cmp(&b.score.value));
            (
                name.to_lowercase(),
                AttributeScore {
                    score: result.summary_score.value,
                    span_begin: top_span.and_then(|s| s.begin),
                    span_end: top_span.and_then(|s| s.end),
                },
            )
        })
        .collect();

    Some(FlatScores {
        languages: response.languages,
        detected_languages: response.detected_languages,
        attributes,
    })
}
