//! Post-collection commands. Each stage reads its input tables from the data
//! directory and writes its output table back there.

use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use modwatch_core::{load_targeting, AppConfig, Table, TableKind};
use modwatch_gather::{ShutdownSignal, TableSink};
use modwatch_review::{
    assess_conversations, compose_conversations, conversations_table, deliberate,
    load_instruction, load_schema, rank_conversations, AssessSettings, DeliberateSettings,
};
use modwatch_scoring::{GeminiClient, GenerationSettings, PerspectiveClient};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BatchArgs {
    pub batch_size: usize,
    pub start_row: usize,
    pub context_size: usize,
}

impl BatchArgs {
    pub(crate) fn for_scoring() -> Self {
        Self {
            batch_size: 50,
            start_row: 0,
            context_size: 19_000,
        }
    }

    pub(crate) fn for_assessment() -> Self {
        Self {
            batch_size: 50,
            start_row: 0,
            context_size: 1_000_000,
        }
    }
}

fn table_path(data_dir: &Path, kind: TableKind) -> std::path::PathBuf {
    data_dir.join(kind.file_name())
}

fn read_table(data_dir: &Path, kind: TableKind) -> anyhow::Result<Table> {
    let path = table_path(data_dir, kind);
    Table::read(&path).with_context(|| format!("failed to read the {kind} table"))
}

pub(crate) fn run_compose(config: &AppConfig) -> anyhow::Result<()> {
    let count = compose_tables(&config.data_dir)?;
    println!("composed {count} conversations");
    Ok(())
}

/// Rewrites the conversations table from the posts and comments tables.
fn compose_tables(data_dir: &Path) -> anyhow::Result<usize> {
    let posts = read_table(data_dir, TableKind::Posts)?;
    let comments = read_table(data_dir, TableKind::Comments)?;
    let conversations = compose_conversations(&posts, &comments)?;
    conversations_table(&conversations).write(&table_path(data_dir, TableKind::Conversations))?;
    tracing::info!(conversations = conversations.len(), "conversations table written");
    Ok(conversations.len())
}

/// Requested attributes from the targeting file, or `TOXICITY` alone if the
/// file cannot be used.
fn requested_attributes(config: &AppConfig) -> Vec<String> {
    match load_targeting(&config.targeting_path) {
        Ok(targeting) => targeting.requested_attributes,
        Err(e) => {
            tracing::warn!(error = %e, "targeting file unusable, scoring TOXICITY only");
            vec!["TOXICITY".to_string()]
        }
    }
}

pub(crate) async fn run_score(
    config: &AppConfig,
    args: &BatchArgs,
    shutdown: &ShutdownSignal,
) -> anyhow::Result<()> {
    let conversations = read_table(&config.data_dir, TableKind::Conversations)?;
    let attributes = requested_attributes(config);
    let scorer = PerspectiveClient::new(
        config.require_perspective_key()?,
        attributes.clone(),
        config.request_timeout_secs,
    )
    .context("failed to build scoring client")?;
    let settings = AssessSettings {
        batch_size: args.batch_size,
        start_row: args.start_row,
        context_size: args.context_size,
        pacing_interval: Duration::from_millis(config.scoring_pacing_ms),
        cooldown: Duration::from_secs(config.scoring_cooldown_secs),
        attributes,
        draw_progress: std::io::stderr().is_terminal(),
    };
    let sink = TableSink::new(&config.data_dir);

    let report = assess_conversations(&conversations, &scorer, &sink, &settings, shutdown).await?;
    println!(
        "scored {} conversations ({} skipped) in {} batches",
        report.assessed, report.skipped, report.batches
    );
    Ok(())
}

pub(crate) fn run_rank(
    config: &AppConfig,
    required_attributes: Option<&[String]>,
) -> anyhow::Result<()> {
    let count = rank_tables(&config.data_dir, required_attributes)?;
    println!("ranked {count} conversations");
    Ok(())
}

/// Rewrites the ranked table from the conversations and perspectives tables.
fn rank_tables(data_dir: &Path, required_attributes: Option<&[String]>) -> anyhow::Result<usize> {
    let conversations = read_table(data_dir, TableKind::Conversations)?;
    let perspectives = read_table(data_dir, TableKind::Perspectives)?;
    let ranked = rank_conversations(&conversations, &perspectives, required_attributes)?;
    ranked.write(&table_path(data_dir, TableKind::Ranked))?;
    Ok(ranked.rows.len())
}

/// The ranked table when it has rows, otherwise every composed conversation.
fn assessment_input(data_dir: &Path) -> anyhow::Result<(TableKind, Table)> {
    let ranked_path = table_path(data_dir, TableKind::Ranked);
    if ranked_path.exists() {
        let ranked = Table::read(&ranked_path)?;
        if !ranked.rows.is_empty() {
            return Ok((TableKind::Ranked, ranked));
        }
    }
    Ok((
        TableKind::Conversations,
        read_table(data_dir, TableKind::Conversations)?,
    ))
}

pub(crate) async fn run_assess(
    config: &AppConfig,
    args: &BatchArgs,
    prompt_path: &Path,
    schema_path: &Path,
    shutdown: &ShutdownSignal,
) -> anyhow::Result<()> {
    let (kind, conversations) = assessment_input(&config.data_dir)?;
    tracing::info!(input = %kind, rows = conversations.rows.len(), "assessing conversations");
    let instruction = load_instruction(prompt_path)?;
    let schema = load_schema(schema_path)?;
    let generator = GeminiClient::new(
        config.require_gemini_key()?,
        GenerationSettings::default(),
        config.request_timeout_secs,
    )
    .context("failed to build generative client")?;
    let settings = DeliberateSettings {
        batch_size: args.batch_size,
        start_row: args.start_row,
        context_size: args.context_size,
        pacing_interval: Duration::from_millis(config.scoring_pacing_ms),
        cooldown: Duration::from_secs(config.scoring_cooldown_secs),
    };
    let sink = TableSink::new(&config.data_dir);

    let report = deliberate(
        &conversations,
        &generator,
        &sink,
        &instruction,
        &schema,
        &settings,
        shutdown,
    )
    .await?;
    println!(
        "assessed {} conversations into {} rows ({} skipped, {} tokens)",
        report.conversations, report.assessments, report.skipped, report.total_tokens
    );
    Ok(())
}
