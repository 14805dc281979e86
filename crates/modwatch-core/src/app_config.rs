use std::path::PathBuf;

use crate::ConfigError;

/// Script-app credentials for the upstream search API.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
}

impl RedditCredentials {
    #[must_use]
    pub fn user_agent(&self) -> String {
        format!("script:modwatch:v1.0 (by u/{})", self.username)
    }
}

impl std::fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("username", &self.username)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub targeting_path: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub reddit: Option<RedditCredentials>,
    pub perspective_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub posts_per_query: usize,
    pub pacing_ms: u64,
    pub rate_limit_cooldown_secs: u64,
    pub comment_expansion_cap: usize,
    pub scoring_pacing_ms: u64,
    pub scoring_cooldown_secs: u64,
    pub shutdown_grace_secs: u64,
    pub status_interval_secs: u64,
}

impl AppConfig {
    /// Upstream credentials, required by the gather stage.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] naming the first absent variable.
    pub fn require_reddit(&self) -> Result<&RedditCredentials, ConfigError> {
        self.reddit
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("REDDIT_CLIENT_ID".to_string()))
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when `PERSPECTIVE_API_KEY` is unset.
    pub fn require_perspective_key(&self) -> Result<&str, ConfigError> {
        self.perspective_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("PERSPECTIVE_API_KEY".to_string()))
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] when `GEMINI_API_KEY` is unset.
    pub fn require_gemini_key(&self) -> Result<&str, ConfigError> {
        self.gemini_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("GEMINI_API_KEY".to_string()))
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("log_level", &self.log_level)
            .field("targeting_path", &self.targeting_path)
            .field("data_dir", &self.data_dir)
            .field("log_dir", &self.log_dir)
            .field("reddit", &self.reddit)
            .field(
                "perspective_api_key",
                &self.perspective_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("posts_per_query", &self.posts_per_query)
            .field("pacing_ms", &self.pacing_ms)
            .field("rate_limit_cooldown_secs", &self.rate_limit_cooldown_secs)
            .field("comment_expansion_cap", &self.comment_expansion_cap)
            .field("scoring_pacing_ms", &self.scoring_pacing_ms)
            .field("scoring_cooldown_secs", &self.scoring_cooldown_secs)
            .field("shutdown_grace_secs", &self.shutdown_grace_secs)
            .field("status_interval_secs", &self.status_interval_secs)
            .finish()
    }
}
