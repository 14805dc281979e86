//! One community's collection loop.
//!
//! A worker repeatedly builds a query, requests a page sized to what is left
//! of its target, fetches comments for every post on the page, optionally
//! scores posts and comments, and appends the page's rows to the sink. The
//! requested count grows by the full page size as soon as the search call
//! returns, whatever it yielded, so a dead query cannot stall the loop.
//!
//! Shutdown is observed at the top of each page and between posts. An
//! in-flight upstream call is never aborted.

use std::sync::Arc;

use modwatch_core::{Comment, CommentRow, FlatScores, Post, PostRow, Record, TableKind};

use crate::cooldown::{retry_once, Attempt, CooldownEvent};
use crate::pacing::{ActiveGuard, Pacer};
use crate::progress::ProgressAggregator;
use crate::query::QueryBuilder;
use crate::run_log::{Level, RunLog};
use crate::settings::GatherSettings;
use crate::shutdown::ShutdownSignal;
use crate::traits::{BatchSink, Scorer, SearchSource};
use crate::GatherError;

/// Handles shared by every worker of a run.
#[derive(Clone)]
pub struct GatherContext {
    pub(crate) settings: Arc<GatherSettings>,
    pub(crate) source: Arc<dyn SearchSource>,
    pub(crate) scorer: Option<Arc<dyn Scorer>>,
    pub(crate) sink: Arc<dyn BatchSink>,
    pub(crate) post_columns: Arc<[String]>,
    pub(crate) comment_columns: Arc<[String]>,
    pub(crate) queries: QueryBuilder,
    pub(crate) progress: Arc<ProgressAggregator>,
    pub(crate) log: RunLog,
    pub(crate) shutdown: ShutdownSignal,
    pub(crate) upstream_pacer: Pacer,
    pub(crate) scoring_pacer: Pacer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Requested count reached the target.
    Completed,
    /// Stopped by the shutdown signal before reaching the target.
    Cancelled,
    /// Ended by a worker-fatal error.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: String,
    pub entity: String,
    pub requested: u64,
    pub queries: u64,
    pub posts_saved: u64,
    pub comments_saved: u64,
    pub outcome: WorkerOutcome,
}

/// What to do with an item after scoring.
enum Scored {
    Keep(Option<FlatScores>),
    Skip,
}

#[derive(Default)]
struct PageBatch {
    posts: Vec<Record>,
    comments: Vec<Record>,
}

pub struct GatherWorker {
    id: String,
    entity: String,
    target: u64,
    ctx: GatherContext,
    _active: ActiveGuard,
}

impl GatherWorker {
    /// `active` keeps this worker counted by the pacers until `run` returns.
    pub(crate) fn new(
        id: String,
        entity: String,
        target: u64,
        ctx: GatherContext,
        active: ActiveGuard,
    ) -> Self {
        Self {
            id,
            entity,
            target,
            ctx,
            _active: active,
        }
    }

    /// Runs to completion, cancellation or a worker-fatal error. Never panics
    /// on upstream or sink failures.
    pub async fn run(self) -> WorkerReport {
        let mut report = WorkerReport {
            worker: self.id.clone(),
            entity: self.entity.clone(),
            requested: 0,
            queries: 0,
            posts_saved: 0,
            comments_saved: 0,
            outcome: WorkerOutcome::Completed,
        };
        self.log(
            Level::Info,
            format!("Starting data collection for {} posts", self.target),
        );

        report.outcome = match self.collect(&mut report).await {
            Ok(()) if report.requested < self.target => WorkerOutcome::Cancelled,
            Ok(()) => WorkerOutcome::Completed,
            Err(e) => {
                self.log(Level::Error, format!("Worker stopped: {e}"));
                WorkerOutcome::Failed(e.to_string())
            }
        };

        self.log(
            Level::Info,
            format!(
                "Finished ({:?}): requested {} of {} posts over {} queries, saved {} posts and {} comments",
                report.outcome,
                report.requested,
                self.target,
                report.queries,
                report.posts_saved,
                report.comments_saved
            ),
        );
        report
    }

    async fn collect(&self, report: &mut WorkerReport) -> Result<(), GatherError> {
        let settings = &self.ctx.settings;
        if settings.per_query_cap == 0 {
            return Err(GatherError::Config(
                "per-query cap must be positive".to_string(),
            ));
        }

        loop {
            if self.ctx.shutdown.is_triggered() {
                self.log(Level::Info, "Shutdown signal observed, stopping");
                return Ok(());
            }

            let remaining = self.target.saturating_sub(report.requested);
            let page_size = usize::try_from(remaining)
                .unwrap_or(usize::MAX)
                .min(settings.per_query_cap);
            if page_size == 0 {
                return Ok(());
            }

            let query = self.ctx.queries.next_query();
            self.log(
                Level::Info,
                format!("Requesting {page_size} posts with query '{query}'"),
            );
            let page = self.search_page(&query, page_size).await;

            let consumed = u64::try_from(page_size).unwrap_or(u64::MAX);
            report.queries += 1;
            report.requested = report.requested.saturating_add(consumed);
            self.ctx.progress.advance(&self.entity, consumed);

            let posts = match page {
                Ok(Attempt::Done(posts)) => {
                    self.ctx.upstream_pacer.pause(&self.ctx.shutdown).await;
                    posts
                }
                Ok(Attempt::Skipped) => {
                    self.log(
                        Level::Warn,
                        format!("Skipping query '{query}' after repeated rate limiting"),
                    );
                    continue;
                }
                Err(e) if e.is_worker_fatal() => return Err(e),
                Err(e) => {
                    self.log(Level::Error, format!("Search for query '{query}' failed: {e}"));
                    self.ctx.upstream_pacer.pause(&self.ctx.shutdown).await;
                    continue;
                }
            };

            let received = posts.len();
            let mut batch = PageBatch::default();
            for post in posts {
                if self.ctx.shutdown.is_triggered() {
                    self.log(
                        Level::Info,
                        "Shutdown signal observed mid-page, saving collected rows",
                    );
                    break;
                }
                if !settings.cutoff.admits(post.created_utc) {
                    continue;
                }
                self.process_post(post, &query, &mut batch).await?;
            }

            let (posts_saved, comments_saved) = self.upload(batch).await?;
            report.posts_saved += posts_saved;
            report.comments_saved += comments_saved;
            self.log(
                Level::Info,
                format!(
                    "Query '{query}' completed: requested {page_size} posts, received {received}, saved {posts_saved} posts and {comments_saved} comments"
                ),
            );
        }
    }

    async fn search_page(
        &self,
        query: &str,
        page_size: usize,
    ) -> Result<Attempt<Vec<Post>>, GatherError> {
        let settings = &self.ctx.settings;
        let what = format!("searching with query '{query}'");
        retry_once(
            settings.rate_limit_cooldown,
            &self.ctx.shutdown,
            is_rate_limited,
            |event, err| self.log_cooldown(event, err, &what, settings.rate_limit_cooldown.as_secs()),
            || {
                self.ctx.source.search(
                    &self.entity,
                    query,
                    page_size,
                    settings.cutoff,
                    settings.sort,
                )
            },
        )
        .await
    }

    /// Adds the post and its comments to `batch`. Per-item failures are logged
    /// and drop the post; only worker-fatal errors are returned.
    async fn process_post(
        &self,
        post: Post,
        query: &str,
        batch: &mut PageBatch,
    ) -> Result<(), GatherError> {
        let post_scores = match &self.ctx.scorer {
            Some(scorer) => {
                let text = post.scoring_text();
                match self
                    .score_item(scorer.as_ref(), &text, &format!("post {}", post.id))
                    .await?
                {
                    Scored::Keep(scores) => scores,
                    Scored::Skip => return Ok(()),
                }
            }
            None => None,
        };

        let settings = &self.ctx.settings;
        let what = format!("fetching comments for post {}", post.id);
        let fetched = retry_once(
            settings.rate_limit_cooldown,
            &self.ctx.shutdown,
            is_rate_limited,
            |event, err| self.log_cooldown(event, err, &what, settings.rate_limit_cooldown.as_secs()),
            || {
                self.ctx
                    .source
                    .fetch_comments(&post, settings.cutoff, settings.expansion_cap)
            },
        )
        .await;

        let comments: Vec<Comment> = match fetched {
            Ok(Attempt::Done(comments)) => {
                self.ctx.upstream_pacer.pause(&self.ctx.shutdown).await;
                comments
                    .into_iter()
                    .filter(|c| settings.cutoff.admits(c.created_utc))
                    .collect()
            }
            Ok(Attempt::Skipped) => {
                self.log(
                    Level::Warn,
                    format!("Skipping post {} after repeated rate limiting", post.id),
                );
                return Ok(());
            }
            Err(e) if e.is_worker_fatal() => return Err(e),
            Err(e) => {
                self.log(
                    Level::Error,
                    format!("Fetching comments for post {} failed: {e}", post.id),
                );
                self.ctx.upstream_pacer.pause(&self.ctx.shutdown).await;
                return Ok(());
            }
        };

        let mut comment_rows = Vec::with_capacity(comments.len());
        for comment in comments {
            let scores = match &self.ctx.scorer {
                Some(scorer) => {
                    match self
                        .score_item(scorer.as_ref(), &comment.body, &format!("comment {}", comment.id))
                        .await?
                    {
                        Scored::Keep(scores) => scores,
                        Scored::Skip => continue,
                    }
                }
                None => None,
            };
            comment_rows.push(
                CommentRow {
                    comment,
                    query: query.to_string(),
                    scores,
                }
                .into_record(),
            );
        }

        batch.posts.push(
            PostRow {
                post,
                query: query.to_string(),
                scores: post_scores,
            }
            .into_record(),
        );
        batch.comments.extend(comment_rows);
        Ok(())
    }

    /// An item the scorer could not score is kept without scores.
    async fn score_item(
        &self,
        scorer: &dyn Scorer,
        text: &str,
        label: &str,
    ) -> Result<Scored, GatherError> {
        let settings = &self.ctx.settings;
        let what = format!("scoring {label}");
        let scored = retry_once(
            settings.scoring_cooldown,
            &self.ctx.shutdown,
            is_rate_limited,
            |event, err| self.log_cooldown(event, err, &what, settings.scoring_cooldown.as_secs()),
            || scorer.score(text),
        )
        .await;

        match scored {
            Ok(Attempt::Done(scores)) => {
                if scores.is_none() {
                    self.log(
                        Level::Debug,
                        format!("No scores returned for {label} (text length {})", text.len()),
                    );
                }
                self.ctx.scoring_pacer.pause(&self.ctx.shutdown).await;
                Ok(Scored::Keep(scores))
            }
            Ok(Attempt::Skipped) => {
                self.log(
                    Level::Warn,
                    format!("Skipping {label} after repeated scorer rate limiting"),
                );
                Ok(Scored::Skip)
            }
            Err(e) if e.is_worker_fatal() => Err(e),
            Err(e) => {
                let level = if matches!(e, GatherError::Rejected(_)) {
                    Level::Warn
                } else {
                    Level::Error
                };
                self.log(
                    level,
                    format!("Skipping {label} (text length {}): {e}", text.len()),
                );
                self.ctx.scoring_pacer.pause(&self.ctx.shutdown).await;
                Ok(Scored::Skip)
            }
        }
    }

    /// One push per non-empty kind. Returns the saved (posts, comments).
    async fn upload(&self, batch: PageBatch) -> Result<(u64, u64), GatherError> {
        let posts = u64::try_from(batch.posts.len()).unwrap_or(u64::MAX);
        let comments = u64::try_from(batch.comments.len()).unwrap_or(u64::MAX);
        if !batch.posts.is_empty() {
            self.ctx
                .sink
                .append_rows(TableKind::Posts, &batch.posts, &self.ctx.post_columns)
                .await?;
        }
        if !batch.comments.is_empty() {
            self.ctx
                .sink
                .append_rows(TableKind::Comments, &batch.comments, &self.ctx.comment_columns)
                .await?;
        }
        Ok((posts, comments))
    }

    fn log_cooldown(&self, event: CooldownEvent, err: &GatherError, what: &str, cooldown_secs: u64) {
        let hint = match err {
            GatherError::RateLimited {
                retry_after_secs: Some(secs),
            } => format!(" (upstream asked for {secs}s)"),
            _ => String::new(),
        };
        let message = match event {
            CooldownEvent::Retrying => {
                format!("Rate limited while {what}{hint}; retrying after {cooldown_secs}s cooldown")
            }
            CooldownEvent::GivingUp => {
                format!("Rate limited again while {what}{hint}; giving up after {cooldown_secs}s cooldown")
            }
        };
        self.log(Level::Warn, message);
    }

    fn log(&self, level: Level, message: impl Into<String>) {
        self.ctx.log.log(level, &self.id, &self.entity, message);
    }
}

fn is_rate_limited(err: &GatherError) -> bool {
    matches!(err, GatherError::RateLimited { .. })
}
