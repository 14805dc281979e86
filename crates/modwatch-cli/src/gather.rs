//! The `gather` command: one worker per community, supervised to the end.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use modwatch_core::{load_targeting, AppConfig, Cutoff};
use modwatch_gather::{
    GatherSettings, GatherSummary, GatherSupervisor, QueryBuilder, RunLog, ShutdownSignal,
    TableSink,
};
use modwatch_reddit::RedditClient;
use modwatch_scoring::PerspectiveClient;

#[derive(Debug, Clone)]
pub(crate) struct GatherArgs {
    pub num_posts: u64,
    pub days_back: u32,
    pub communities: Vec<String>,
    pub score: bool,
}

impl Default for GatherArgs {
    fn default() -> Self {
        Self {
            num_posts: 200,
            days_back: 99_999,
            communities: Vec::new(),
            score: false,
        }
    }
}

/// Gathers from every targeted community until each reaches `num_posts`
/// requested posts or shutdown is signalled.
///
/// # Errors
///
/// Returns an error if configuration is incomplete, a client cannot be
/// built, the run cannot start, or every worker failed.
pub(crate) async fn run_gather(
    config: &AppConfig,
    args: &GatherArgs,
    shutdown: &ShutdownSignal,
) -> anyhow::Result<()> {
    let targeting = load_targeting(&config.targeting_path)?;
    let communities = if args.communities.is_empty() {
        targeting.communities.clone()
    } else {
        args.communities.clone()
    };

    let credentials = config.require_reddit()?.clone();
    let source = RedditClient::new(credentials, config.request_timeout_secs)
        .context("failed to build reddit client")?
        .with_expansion_pacing(Duration::from_millis(config.pacing_ms));
    let queries = QueryBuilder::new(&targeting.search_terms, &targeting.neutral_terms)?;
    let cutoff = Cutoff::days_back(args.days_back, Utc::now());
    let settings = GatherSettings::from_config(
        config,
        cutoff,
        targeting.requested_attributes.clone(),
    );
    let log = RunLog::create(&config.log_dir)
        .await
        .with_context(|| format!("failed to create run log in {}", config.log_dir.display()))?;
    if let Some(path) = log.path() {
        tracing::info!(path = %path.display(), "writing run log");
    }

    let mut supervisor = GatherSupervisor::new(
        settings,
        Arc::new(source),
        Arc::new(TableSink::new(&config.data_dir)),
        queries,
        log,
    )
    .with_shutdown(shutdown.clone())
    .with_progress_bar(std::io::stderr().is_terminal());

    if args.score {
        let scorer = PerspectiveClient::new(
            config.require_perspective_key()?,
            targeting.requested_attributes.clone(),
            config.request_timeout_secs,
        )
        .context("failed to build scoring client")?;
        supervisor = supervisor.with_scorer(Arc::new(scorer));
    }

    let run = supervisor.start(&communities, args.num_posts).await?;
    let summary = run.wait().await;
    print_summary(&summary);

    if summary.all_failed() {
        anyhow::bail!(
            "every worker failed: {}",
            summary.failed.join(", ")
        );
    }
    Ok(())
}

fn print_summary(summary: &GatherSummary) {
    println!(
        "gather finished in {:.1}s: {} of {} posts requested{}",
        summary.elapsed.as_secs_f64(),
        summary.progress.total,
        summary.progress.target_total,
        if summary.cancelled { " (interrupted)" } else { "" }
    );
    for report in &summary.reports {
        println!(
            "  {}: {} queries, {} requested, {} posts and {} comments saved ({:?})",
            report.entity,
            report.queries,
            report.requested,
            report.posts_saved,
            report.comments_saved,
            report.outcome
        );
    }
    if !summary.failed.is_empty() {
        println!("  failed: {}", summary.failed.join(", "));
    }
    if !summary.unfinished.is_empty() {
        println!("  still running at exit: {}", summary.unfinished.join(", "));
    }
}
