//! Toxicity scoring of composed conversations.
//!
//! Conversations are scored in batches starting at `start_row`. Each batch
//! that produced at least one row is appended to the `perspectives` table
//! before the next batch starts, so an interrupted run can resume from the
//! last uploaded batch.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use modwatch_core::table::str_field;
use modwatch_core::{FlatScores, Record, Table, TableKind};
use modwatch_gather::cooldown::{retry_once, Attempt, CooldownEvent};
use modwatch_gather::{BatchSink, GatherError, Scorer, ShutdownSignal};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{require_columns, ReviewError};
use crate::{id_cell, truncate_chars};

/// Hard ceiling on submitted characters, below the scorer's request limit.
pub const MAX_SCORED_CHARS: usize = 19_000;

#[derive(Debug, Clone)]
pub struct AssessSettings {
    pub batch_size: usize,
    pub start_row: usize,
    pub context_size: usize,
    pub pacing_interval: Duration,
    pub cooldown: Duration,
    /// Requested attributes; determines the score columns.
    pub attributes: Vec<String>,
    pub draw_progress: bool,
}

impl Default for AssessSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            start_row: 0,
            context_size: MAX_SCORED_CHARS,
            pacing_interval: Duration::from_millis(1100),
            cooldown: Duration::from_secs(10),
            attributes: vec!["TOXICITY".to_string()],
            draw_progress: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssessReport {
    pub assessed: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub batches: usize,
}

/// Default `perspectives` columns for `attributes`.
#[must_use]
pub fn perspective_columns(attributes: &[String]) -> Vec<String> {
    let mut columns = vec![
        "perspective_id".to_string(),
        "sheet_name".to_string(),
        "post_id".to_string(),
    ];
    columns.extend(FlatScores::columns(attributes));
    columns
}

/// Scores every conversation from `settings.start_row` on and appends the
/// results to the `perspectives` table.
///
/// # Errors
///
/// Returns [`ReviewError::MissingColumns`] for a malformed conversations
/// table, or [`ReviewError::Sink`] when a batch cannot be saved.
pub async fn assess_conversations(
    conversations: &Table,
    scorer: &dyn Scorer,
    sink: &dyn BatchSink,
    settings: &AssessSettings,
    shutdown: &ShutdownSignal,
) -> Result<AssessReport, ReviewError> {
    require_columns(
        conversations,
        TableKind::Conversations,
        &["post_id", "full_conversation"],
    )?;
    let columns = sink
        .ensure_header(
            TableKind::Perspectives,
            &perspective_columns(&settings.attributes),
        )
        .await?;

    let max_chars = settings.context_size.min(MAX_SCORED_CHARS);
    let records = conversations.records();
    let pending = records.get(settings.start_row..).unwrap_or_default();
    let bar = progress_bar(pending.len(), settings.draw_progress);
    let mut report = AssessReport::default();

    for batch in pending.chunks(settings.batch_size.max(1)) {
        if shutdown.is_triggered() {
            break;
        }
        let mut rows = Vec::new();
        for record in batch {
            if shutdown.is_triggered() {
                break;
            }
            bar.inc(1);
            let Some(post_id) = id_cell(record.get("post_id")) else {
                report.skipped += 1;
                continue;
            };
            let Some(text) = str_field(record, "full_conversation").filter(|t| !t.is_empty())
            else {
                report.skipped += 1;
                continue;
            };
            let text = truncate_chars(text, max_chars);

            match score_conversation(scorer, text, &post_id, settings, shutdown).await? {
                Some(scores) => {
                    report.assessed += 1;
                    rows.push(perspective_row(&post_id, &scores));
                }
                None => report.skipped += 1,
            }
        }

        if !rows.is_empty() {
            sink.append_rows(TableKind::Perspectives, &rows, &columns)
                .await?;
            report.uploaded += rows.len();
            tracing::info!(rows = rows.len(), "uploaded perspectives batch");
        }
        report.batches += 1;
    }

    bar.finish();
    Ok(report)
}

/// `None` skips the conversation.
async fn score_conversation(
    scorer: &dyn Scorer,
    text: &str,
    post_id: &str,
    settings: &AssessSettings,
    shutdown: &ShutdownSignal,
) -> Result<Option<FlatScores>, ReviewError> {
    let text_len = text.chars().count();
    let scored = retry_once(
        settings.cooldown,
        shutdown,
        is_rate_limited,
        |event, _| match event {
            CooldownEvent::Retrying => {
                tracing::warn!(post_id, text_len, "rate limited, retrying after cooldown");
            }
            CooldownEvent::GivingUp => {
                tracing::warn!(post_id, text_len, "rate limited again, skipping conversation");
            }
        },
        || scorer.score(text),
    )
    .await;

    let scores = match scored {
        Ok(Attempt::Done(Some(scores))) => Some(scores),
        Ok(Attempt::Done(None)) => {
            tracing::warn!(post_id, text_len, "no scores returned, skipping conversation");
            None
        }
        Ok(Attempt::Skipped) => return Ok(None),
        Err(e) if e.is_worker_fatal() => return Err(e.into()),
        Err(e) => {
            tracing::warn!(post_id, text_len, error = %e, "scoring failed, skipping conversation");
            None
        }
    };
    shutdown.sleep(settings.pacing_interval).await;
    Ok(scores)
}

fn is_rate_limited(err: &GatherError) -> bool {
    matches!(err, GatherError::RateLimited { .. })
}

fn perspective_row(post_id: &str, scores: &FlatScores) -> Record {
    let mut row = Record::new();
    row.insert(
        "perspective_id".to_string(),
        Value::from(Uuid::new_v4().to_string()),
    );
    row.insert(
        "sheet_name".to_string(),
        Value::from(TableKind::Conversations.as_str()),
    );
    row.insert("post_id".to_string(), Value::from(post_id));
    scores.write_into(&mut row);
    row
}

fn progress_bar(len: usize, draw: bool) -> ProgressBar {
    if !draw {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::with_draw_target(
        Some(u64::try_from(len).unwrap_or(u64::MAX)),
        ProgressDrawTarget::stderr(),
    );
    if let Ok(style) =
        ProgressStyle::with_template("Conversations assessed: {pos}/{len} [{elapsed_precise}]")
    {
        bar.set_style(style);
    }
    bar
}
