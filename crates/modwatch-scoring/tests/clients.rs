//! Integration tests for the scoring clients using wiremock HTTP mocks.

use modwatch_scoring::{GeminiClient, GenerationSettings, PerspectiveClient, ScoringError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn perspective(server: &MockServer) -> PerspectiveClient {
    PerspectiveClient::with_base_url(
        "pk",
        vec!["TOXICITY".to_string(), "INSULT".to_string()],
        30,
        &server.uri(),
    )
    .expect("client construction should not fail")
}

fn gemini(server: &MockServer) -> GeminiClient {
    GeminiClient::with_base_url("gk", GenerationSettings::default(), 30, &server.uri())
        .expect("client construction should not fail")
}

// ---------------------------------------------------------------------------
// Perspective
// ---------------------------------------------------------------------------

#[tokio::test]
async fn analyze_sends_requested_attributes_and_flattens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1alpha1/comments:analyze"))
        .and(query_param("key", "pk"))
        .and(body_partial_json(json!({
            "comment": { "text": "you fool" },
            "spanAnnotations": true,
            "requestedAttributes": { "TOXICITY": {}, "INSULT": {} }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "attributeScores": {
                "TOXICITY": {
                    "summaryScore": { "value": 0.4, "type": "PROBABILITY" },
                    "spanScores": [{ "begin": 0, "end": 8, "score": { "value": 0.4 } }]
                },
                "INSULT": {
                    "summaryScore": { "value": 0.8, "type": "PROBABILITY" },
                    "spanScores": [{ "begin": 4, "end": 8, "score": { "value": 0.8 } }]
                }
            },
            "languages": ["en"],
            "detectedLanguages": ["en"]
        })))
        .mount(&server)
        .await;

    let scores = perspective(&server)
        .analyze("you fool")
        .await
        .expect("analyze should succeed")
        .expect("scores should be present");

    assert_eq!(scores.languages, vec!["en"]);
    let (top, score) = scores.highest().unwrap();
    assert_eq!(top, "insult");
    assert_eq!(score.span_begin, Some(4));
}

#[tokio::test]
async fn analyze_429_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = perspective(&server).analyze("x").await.unwrap_err();
    assert!(matches!(err, ScoringError::RateLimited));
}

#[tokio::test]
async fn analyze_400_is_bad_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "language not supported" }
        })))
        .mount(&server)
        .await;

    let err = perspective(&server).analyze("x").await.unwrap_err();
    assert!(
        matches!(err, ScoringError::BadRequest { ref message } if message == "language not supported"),
        "got {err:?}"
    );
}

#[tokio::test]
async fn analyze_without_scores_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "languages": ["xx"] })))
        .mount(&server)
        .await;

    assert!(perspective(&server).analyze("x").await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generate_structured_parses_candidate_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash-lite:generateContent"))
        .and(query_param("key", "gk"))
        .and(body_partial_json(json!({
            "generationConfig": { "responseMimeType": "application/json", "topK": 40 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "thinking...", "thought": true },
                    { "text": "[{\"flagged\": true}]" }
                ] }
            }],
            "usageMetadata": { "totalTokenCount": 321 }
        })))
        .mount(&server)
        .await;

    let response = gemini(&server)
        .generate_structured("[Post ID: p1] hi", "assess", &json!({ "type": "array" }))
        .await
        .unwrap();

    assert_eq!(response.value, json!([{ "flagged": true }]));
    assert_eq!(response.total_tokens, Some(321));
}

#[tokio::test]
async fn generate_structured_non_json_text_is_deserialize_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "not json" }] } }]
        })))
        .mount(&server)
        .await;

    let err = gemini(&server)
        .generate_structured("p", "s", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ScoringError::Deserialize { .. }));
}

#[tokio::test]
async fn generate_structured_429_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = gemini(&server)
        .generate_structured("p", "s", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ScoringError::RateLimited));
}
