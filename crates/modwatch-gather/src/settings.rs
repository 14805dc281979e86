use std::time::Duration;

use modwatch_core::{AppConfig, Cutoff, SearchSort};

/// Tunables for one gather run.
#[derive(Debug, Clone)]
pub struct GatherSettings {
    pub per_query_cap: usize,
    pub pacing_interval: Duration,
    pub rate_limit_cooldown: Duration,
    pub expansion_cap: usize,
    pub cutoff: Cutoff,
    pub sort: SearchSort,
    pub scoring_pacing_interval: Duration,
    pub scoring_cooldown: Duration,
    pub grace_period: Duration,
    pub poll_interval: Duration,
    pub status_interval: Duration,
    /// Requested scorer attributes; determines the score columns.
    pub attributes: Vec<String>,
}

impl GatherSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig, cutoff: Cutoff, attributes: Vec<String>) -> Self {
        Self {
            per_query_cap: config.posts_per_query,
            pacing_interval: Duration::from_millis(config.pacing_ms),
            rate_limit_cooldown: Duration::from_secs(config.rate_limit_cooldown_secs),
            expansion_cap: config.comment_expansion_cap,
            cutoff,
            sort: SearchSort::New,
            scoring_pacing_interval: Duration::from_millis(config.scoring_pacing_ms),
            scoring_cooldown: Duration::from_secs(config.scoring_cooldown_secs),
            grace_period: Duration::from_secs(config.shutdown_grace_secs),
            poll_interval: Duration::from_secs(1),
            status_interval: Duration::from_secs(config.status_interval_secs),
            attributes,
        }
    }
}

impl Default for GatherSettings {
    fn default() -> Self {
        Self {
            per_query_cap: 40,
            pacing_interval: Duration::from_millis(600),
            rate_limit_cooldown: Duration::from_secs(60),
            expansion_cap: 10,
            cutoff: Cutoff::AllTime,
            sort: SearchSort::New,
            scoring_pacing_interval: Duration::from_millis(1100),
            scoring_cooldown: Duration::from_secs(10),
            grace_period: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            status_interval: Duration::from_secs(30),
            attributes: vec!["TOXICITY".to_string()],
        }
    }
}
