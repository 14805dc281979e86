//! Engine seams implemented by the concrete HTTP clients.

use async_trait::async_trait;
use modwatch_core::{Comment, Cutoff, FlatScores, Post, SearchSort};
use modwatch_reddit::{RedditClient, RedditError};
use modwatch_scoring::{PerspectiveClient, ScoringError};

use crate::traits::{Scorer, SearchSource};
use crate::GatherError;

impl From<RedditError> for GatherError {
    fn from(err: RedditError) -> Self {
        match err {
            RedditError::RateLimited { retry_after_secs } => GatherError::RateLimited {
                retry_after_secs: Some(retry_after_secs),
            },
            RedditError::NotFound { url } => GatherError::NotFound(url),
            RedditError::Auth(message) => GatherError::Unauthorized(message),
            other => GatherError::Upstream(other.to_string()),
        }
    }
}

impl From<ScoringError> for GatherError {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::RateLimited => GatherError::RateLimited {
                retry_after_secs: None,
            },
            ScoringError::BadRequest { message } => GatherError::Rejected(message),
            other => GatherError::Upstream(other.to_string()),
        }
    }
}

#[async_trait]
impl SearchSource for RedditClient {
    async fn search(
        &self,
        entity: &str,
        query: &str,
        page_size: usize,
        cutoff: Cutoff,
        sort: SearchSort,
    ) -> Result<Vec<Post>, GatherError> {
        Ok(self
            .search_community(entity, query, page_size, cutoff, sort)
            .await?)
    }

    async fn fetch_comments(
        &self,
        post: &Post,
        cutoff: Cutoff,
        expansion_cap: usize,
    ) -> Result<Vec<Comment>, GatherError> {
        Ok(RedditClient::fetch_comments(self, post, cutoff, expansion_cap).await?)
    }
}

#[async_trait]
impl Scorer for PerspectiveClient {
    async fn score(&self, text: &str) -> Result<Option<FlatScores>, GatherError> {
        Ok(self.analyze(text).await?)
    }
}
