use thiserror::Error;

/// Errors returned by the scoring clients.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP 429: quota exhausted for now.
    #[error("scoring service rate limited the request")]
    RateLimited,

    /// HTTP 400: the input cannot be scored (e.g. unsupported language).
    #[error("scoring service rejected the input: {message}")]
    BadRequest { message: String },

    #[error("unexpected HTTP status {status} from {service}")]
    UnexpectedStatus { status: u16, service: &'static str },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Maps a non-success status to the matching error. The body is kept for
/// 400 responses only.
pub(crate) fn status_error(status: reqwest::StatusCode, body: &str, service: &'static str) -> ScoringError {
    match status.as_u16() {
        429 => ScoringError::RateLimited,
        400 => ScoringError::BadRequest {
            message: extract_message(body),
        },
        code => ScoringError::UnexpectedStatus {
            status: code,
            service,
        },
    }
}

/// Google APIs wrap errors as `{"error": {"message": ...}}`.
fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(serde_json::Value::as_str)
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

pub(crate) fn normalise_base(base: &str) -> Result<reqwest::Url, ScoringError> {
    let normalised = format!("{}/", base.trim_end_matches('/'));
    reqwest::Url::parse(&normalised).map_err(|e| ScoringError::InvalidBaseUrl {
        url: base.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    #[test]
    fn bad_request_extracts_google_error_message() {
        let body = r#"{"error":{"code":400,"message":"Attribute TOXICITY does not support request languages: xx"}}"#;
        let err = status_error(StatusCode::BAD_REQUEST, body, "perspective");
        assert!(
            matches!(err, ScoringError::BadRequest { ref message } if message.contains("does not support"))
        );
    }

    #[test]
    fn too_many_requests_is_rate_limited() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "", "perspective"),
            ScoringError::RateLimited
        ));
    }

    #[test]
    fn other_statuses_are_unexpected() {
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "", "gemini"),
            ScoringError::UnexpectedStatus {
                status: 502,
                service: "gemini"
            }
        ));
    }
}
