//! Collaborator seams used by the workers.

use async_trait::async_trait;
use modwatch_core::{Comment, Cutoff, FlatScores, Post, Record, SearchSort, TableKind};

use crate::GatherError;

/// Upstream search and comment retrieval.
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Up to `page_size` posts from `entity` matching `query`. A missing
    /// entity yields an empty result, not an error.
    async fn search(
        &self,
        entity: &str,
        query: &str,
        page_size: usize,
        cutoff: Cutoff,
        sort: SearchSort,
    ) -> Result<Vec<Post>, GatherError>;

    /// Comments of `post`, with at most `expansion_cap` "load more" expansions.
    async fn fetch_comments(
        &self,
        post: &Post,
        cutoff: Cutoff,
        expansion_cap: usize,
    ) -> Result<Vec<Comment>, GatherError>;
}

/// Synchronous text classifier. `Ok(None)` means the text could not be scored.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<Option<FlatScores>, GatherError>;
}

/// Append-only tabular persistence.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// The current header row for `kind`, writing `default_columns` first if
    /// the table has none yet.
    async fn ensure_header(
        &self,
        kind: TableKind,
        default_columns: &[String],
    ) -> Result<Vec<String>, GatherError>;

    /// Appends `rows` projected onto `columns`. Never de-duplicates.
    async fn append_rows(
        &self,
        kind: TableKind,
        rows: &[Record],
        columns: &[String],
    ) -> Result<(), GatherError>;
}
