use modwatch_core::{TableError, TableKind};
use thiserror::Error;

/// Errors crossing the engine's collaborator seams.
#[derive(Debug, Error)]
pub enum GatherError {
    /// Quota exceeded; the caller cools down and retries once. Carries the
    /// wait the upstream asked for, when it named one.
    #[error("rate limited by upstream")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("not found: {0}")]
    NotFound(String),

    /// Permanent rejection of this input (e.g. unsupported language).
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("sink error for {kind}: {source}")]
    Sink {
        kind: TableKind,
        #[source]
        source: TableError,
    },

    #[error("invalid gather configuration: {0}")]
    Config(String),
}

impl GatherError {
    /// Errors that end the worker instead of skipping one page or item.
    #[must_use]
    pub fn is_worker_fatal(&self) -> bool {
        matches!(
            self,
            GatherError::Sink { .. } | GatherError::Unauthorized(_) | GatherError::Config(_)
        )
    }
}
