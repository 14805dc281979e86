//! Generative assessment of conversations.
//!
//! Each conversation is sent to the generative model as
//! `[Post ID: <id>] <text>` with a fixed system instruction and a response
//! schema. Every object in the structured response becomes one row of the
//! `assessments` table.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use modwatch_core::table::str_field;
use modwatch_core::{Record, Table, TableKind};
use modwatch_gather::cooldown::{retry_once, Attempt, CooldownEvent};
use modwatch_gather::{BatchSink, ShutdownSignal};
use modwatch_scoring::{GeminiClient, GeminiResponse, ScoringError};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{require_columns, ReviewError};
use crate::{id_cell, truncate_chars};

/// Columns written ahead of the schema's own fields.
const BASE_COLUMNS: [&str; 5] = [
    "assessment_id",
    "sheet_name",
    "post_id",
    "conversation_length",
    "total_tokens",
];

/// Structured text generation.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
        response_schema: &Value,
    ) -> Result<GeminiResponse, ScoringError>;
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
        response_schema: &Value,
    ) -> Result<GeminiResponse, ScoringError> {
        self.generate_structured(prompt, system_instruction, response_schema)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct DeliberateSettings {
    pub batch_size: usize,
    pub start_row: usize,
    pub context_size: usize,
    pub pacing_interval: Duration,
    pub cooldown: Duration,
}

impl Default for DeliberateSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            start_row: 0,
            context_size: 1_000_000,
            pacing_interval: Duration::from_millis(1100),
            cooldown: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliberateReport {
    pub conversations: usize,
    pub assessments: usize,
    pub skipped: usize,
    pub total_tokens: u64,
}

/// Reads a system instruction file.
///
/// # Errors
///
/// Returns [`ReviewError::Io`] if the file cannot be read.
pub fn load_instruction(path: &Path) -> Result<String, ReviewError> {
    std::fs::read_to_string(path).map_err(|source| ReviewError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Reads a JSON response schema.
///
/// # Errors
///
/// Returns [`ReviewError::Io`] if the file cannot be read and
/// [`ReviewError::InvalidSchema`] if it is not a JSON object.
pub fn load_schema(path: &Path) -> Result<Value, ReviewError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ReviewError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let schema: Value = serde_json::from_str(&raw)
        .map_err(|e| ReviewError::InvalidSchema(format!("{}: {e}", path.display())))?;
    if !schema.is_object() {
        return Err(ReviewError::InvalidSchema(format!(
            "{}: expected a JSON object",
            path.display()
        )));
    }
    Ok(schema)
}

/// Default `assessments` columns: the fixed prefix, then the properties the
/// schema declares for one assessment (array `items` or the object itself).
#[must_use]
pub fn assessment_columns(schema: &Value) -> Vec<String> {
    let item = schema.get("items").unwrap_or(schema);
    let mut columns: Vec<String> = BASE_COLUMNS.iter().map(ToString::to_string).collect();
    if let Some(properties) = item.get("properties").and_then(Value::as_object) {
        for name in properties.keys() {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
    }
    columns
}

/// Assesses every conversation from `settings.start_row` on and appends one
/// row per returned assessment to the `assessments` table.
///
/// # Errors
///
/// Returns [`ReviewError::MissingColumns`] for a malformed input table, or
/// [`ReviewError::Sink`] when a batch cannot be saved.
pub async fn deliberate(
    conversations: &Table,
    generator: &dyn Generator,
    sink: &dyn BatchSink,
    system_instruction: &str,
    response_schema: &Value,
    settings: &DeliberateSettings,
    shutdown: &ShutdownSignal,
) -> Result<DeliberateReport, ReviewError> {
    require_columns(
        conversations,
        TableKind::Conversations,
        &["post_id", "full_conversation"],
    )?;
    let columns = sink
        .ensure_header(TableKind::Assessments, &assessment_columns(response_schema))
        .await?;

    let records = conversations.records();
    let pending = records.get(settings.start_row..).unwrap_or_default();
    let mut report = DeliberateReport::default();

    for batch in pending.chunks(settings.batch_size.max(1)) {
        if shutdown.is_triggered() {
            break;
        }
        let mut rows = Vec::new();
        for record in batch {
            if shutdown.is_triggered() {
                break;
            }
            let Some(post_id) = id_cell(record.get("post_id")) else {
                report.skipped += 1;
                continue;
            };
            let Some(text) = str_field(record, "full_conversation").filter(|t| !t.is_empty())
            else {
                report.skipped += 1;
                continue;
            };
            let text = truncate_chars(text, settings.context_size);
            let prompt = format!("[Post ID: {post_id}] {text}");

            let Some(response) = generate(
                generator,
                &prompt,
                system_instruction,
                response_schema,
                &post_id,
                settings,
                shutdown,
            )
            .await
            else {
                report.skipped += 1;
                continue;
            };

            report.conversations += 1;
            report.total_tokens += response.total_tokens.unwrap_or(0);
            let produced = assessment_rows(&response, &post_id, text.chars().count());
            if produced.is_empty() {
                tracing::warn!(post_id = %post_id, "response held no assessment objects");
            }
            rows.extend(produced);
        }

        if !rows.is_empty() {
            sink.append_rows(TableKind::Assessments, &rows, &columns)
                .await?;
            report.assessments += rows.len();
            tracing::info!(rows = rows.len(), "uploaded assessments batch");
        }
    }

    tracing::info!(
        conversations = report.conversations,
        assessments = report.assessments,
        total_tokens = report.total_tokens,
        "generative assessment finished"
    );
    Ok(report)
}

/// One call under the retry-once policy. `None` skips the conversation.
async fn generate(
    generator: &dyn Generator,
    prompt: &str,
    system_instruction: &str,
    response_schema: &Value,
    post_id: &str,
    settings: &DeliberateSettings,
    shutdown: &ShutdownSignal,
) -> Option<GeminiResponse> {
    let prompt_len = prompt.chars().count();
    let result = retry_once(
        settings.cooldown,
        shutdown,
        is_rate_limited,
        |event, _| match event {
            CooldownEvent::Retrying => {
                tracing::warn!(post_id, prompt_len, "rate limited, retrying after cooldown");
            }
            CooldownEvent::GivingUp => {
                tracing::warn!(post_id, prompt_len, "rate limited again, skipping conversation");
            }
        },
        || generator.generate(prompt, system_instruction, response_schema),
    )
    .await;

    let response = match result {
        Ok(Attempt::Done(response)) => Some(response),
        Ok(Attempt::Skipped) => return None,
        Err(e) => {
            tracing::warn!(post_id, prompt_len, error = %e, "generation failed, skipping conversation");
            None
        }
    };
    shutdown.sleep(settings.pacing_interval).await;
    response
}

fn is_rate_limited(err: &ScoringError) -> bool {
    matches!(err, ScoringError::RateLimited)
}

/// A response may be one object or an array of them; other values are ignored.
fn assessment_rows(response: &GeminiResponse, post_id: &str, conversation_length: usize) -> Vec<Record> {
    let objects: Vec<&serde_json::Map<String, Value>> = match &response.value {
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        Value::Object(object) => vec![object],
        _ => Vec::new(),
    };

    objects
        .into_iter()
        .map(|object| {
            let mut row = object.clone();
            row.insert(
                "assessment_id".to_string(),
                Value::from(Uuid::new_v4().to_string()),
            );
            row.insert(
                "sheet_name".to_string(),
                Value::from(TableKind::Conversations.as_str()),
            );
            row.insert("post_id".to_string(), Value::from(post_id));
            row.insert(
                "conversation_length".to_string(),
                Value::from(conversation_length),
            );
            row.insert(
                "total_tokens".to_string(),
                response.total_tokens.map_or(Value::Null, Value::from),
            );
            row
        })
        .collect()
}
