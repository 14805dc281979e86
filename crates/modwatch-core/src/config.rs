use crate::app_config::{AppConfig, RedditCredentials};
use crate::ConfigError;

/// Reads `.env` (if present) into the process environment, then builds the
/// configuration from it.
///
/// # Errors
///
/// Returns `ConfigError` if a value is invalid or credentials are only
/// partially set.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from the variables already in the process.
///
/// # Errors
///
/// Returns `ConfigError` if a value is invalid or credentials are only
/// partially set.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var).ok().filter(|v| !v.trim().is_empty())
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let reddit = {
        let id = optional("REDDIT_CLIENT_ID");
        let secret = optional("REDDIT_CLIENT_SECRET");
        let username = optional("REDDIT_USERNAME");
        match (id, secret, username) {
            (None, None, None) => None,
            (Some(client_id), Some(client_secret), Some(username)) => Some(RedditCredentials {
                client_id,
                client_secret,
                username,
            }),
            (id, secret, _) => {
                let missing = if id.is_none() {
                    "REDDIT_CLIENT_ID"
                } else if secret.is_none() {
                    "REDDIT_CLIENT_SECRET"
                } else {
                    "REDDIT_USERNAME"
                };
                return Err(ConfigError::MissingEnvVar(missing.to_string()));
            }
        }
    };

    let posts_per_query = parse_usize("MODWATCH_POSTS_PER_QUERY", "40")?;
    if posts_per_query == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "MODWATCH_POSTS_PER_QUERY".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    Ok(AppConfig {
        log_level: or_default("MODWATCH_LOG_LEVEL", "info"),
        targeting_path: PathBuf::from(or_default(
            "MODWATCH_TARGETING_PATH",
            "./config/targeting.yaml",
        )),
        data_dir: PathBuf::from(or_default("MODWATCH_DATA_DIR", "./data")),
        log_dir: PathBuf::from(or_default("MODWATCH_LOG_DIR", "./logs")),
        reddit,
        perspective_api_key: optional("PERSPECTIVE_API_KEY"),
        gemini_api_key: optional("GEMINI_API_KEY"),
        request_timeout_secs: parse_u64("MODWATCH_REQUEST_TIMEOUT_SECS", "30")?,
        posts_per_query,
        pacing_ms: parse_u64("MODWATCH_PACING_MS", "600")?,
        rate_limit_cooldown_secs: parse_u64("MODWATCH_RATE_LIMIT_COOLDOWN_SECS", "60")?,
        comment_expansion_cap: parse_usize("MODWATCH_COMMENT_EXPANSION_CAP", "10")?,
        scoring_pacing_ms: parse_u64("MODWATCH_SCORING_PACING_MS", "1100")?,
        scoring_cooldown_secs: parse_u64("MODWATCH_SCORING_COOLDOWN_SECS", "10")?,
        shutdown_grace_secs: parse_u64("MODWATCH_SHUTDOWN_GRACE_SECS", "5")?,
        status_interval_secs: parse_u64("MODWATCH_STATUS_INTERVAL_SECS", "30")?,
    })
}
