use thiserror::Error;

/// Errors returned by [`crate::RedditClient`].
#[derive(Debug, Error)]
pub enum RedditError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The token exchange was refused, or a fresh token was rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// HTTP 429 from the API.
    #[error("rate limited by Reddit; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("resource not found: {url}")]
    NotFound { url: String },

    #[error("unexpected HTTP status {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}
