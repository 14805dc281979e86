use std::collections::HashMap;

use modwatch_core::{Table, TableKind};
use serde_json::Value;

use crate::error::{require_columns, ReviewError};
use crate::id_cell;

/// The strongest attribute of one scored conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct MaxScore {
    pub post_id: String,
    pub max_attribute: String,
    pub max_score: f64,
    pub max_span_begin: Option<u64>,
    pub max_span_end: Option<u64>,
}

/// Per perspectives row, the highest `<attribute>_score` cell. Ties keep the
/// column that comes first. Rows without an id or any numeric score are
/// dropped.
///
/// # Errors
///
/// Returns [`ReviewError::MissingColumns`] without a `post_id` column.
pub fn max_scores(perspectives: &Table) -> Result<Vec<MaxScore>, ReviewError> {
    require_columns(perspectives, TableKind::Perspectives, &["post_id"])?;
    let score_columns: Vec<&str> = perspectives
        .columns
        .iter()
        .map(String::as_str)
        .filter(|c| c.ends_with("_score") && *c != "max_score")
        .collect();

    let mut out = Vec::new();
    for record in perspectives.records() {
        let Some(post_id) = id_cell(record.get("post_id")) else {
            continue;
        };
        let mut best: Option<(&str, f64)> = None;
        for column in &score_columns {
            let Some(score) = record.get(*column).and_then(Value::as_f64) else {
                continue;
            };
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((*column, score));
            }
        }
        let Some((column, max_score)) = best else {
            continue;
        };
        let attribute = column.trim_end_matches("_score");
        let span = |suffix: &str| {
            record
                .get(&format!("{attribute}_max_span_{suffix}"))
                .and_then(Value::as_u64)
        };
        out.push(MaxScore {
            max_span_begin: span("begin"),
            max_span_end: span("end"),
            post_id,
            max_attribute: attribute.to_string(),
            max_score,
        });
    }
    Ok(out)
}

/// Conversations joined with their max scores (inner join on `post_id`),
/// highest score first. With `required_attributes`, only rows whose max
/// attribute is in the list (case-insensitively) survive.
///
/// # Errors
///
/// Returns [`ReviewError::MissingColumns`] if either table lacks `post_id`.
pub fn rank_conversations(
    conversations: &Table,
    perspectives: &Table,
    required_attributes: Option<&[String]>,
) -> Result<Table, ReviewError> {
    require_columns(conversations, TableKind::Conversations, &["post_id"])?;
    let mut scores = max_scores(perspectives)?;

    if let Some(required) = required_attributes {
        let wanted: Vec<String> = required.iter().map(|a| a.to_lowercase()).collect();
        scores.retain(|s| wanted.contains(&s.max_attribute.to_lowercase()));
        if scores.is_empty() {
            tracing::warn!(
                attributes = %required.join(","),
                "no conversations have the requested attributes"
            );
        }
    }

    let mut by_post: HashMap<&str, Vec<&MaxScore>> = HashMap::new();
    for score in &scores {
        by_post.entry(score.post_id.as_str()).or_default().push(score);
    }

    let kept: Vec<usize> = conversations
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| *c != "max_score" && *c != "max_attribute")
        .map(|(i, _)| i)
        .collect();
    let mut columns: Vec<String> = kept.iter().map(|&i| conversations.columns[i].clone()).collect();
    columns.push("max_score".to_string());
    columns.push("max_attribute".to_string());

    let post_index = conversations.column_index("post_id");
    let mut joined: Vec<(f64, Vec<Value>)> = Vec::new();
    for row in &conversations.rows {
        let Some(post_id) = id_cell(post_index.and_then(|i| row.get(i))) else {
            continue;
        };
        let Some(matches) = by_post.get(post_id.as_str()) else {
            continue;
        };
        for score in matches {
            let mut values: Vec<Value> = kept
                .iter()
                .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
                .collect();
            values.push(Value::from(score.max_score));
            values.push(Value::from(score.max_attribute.clone()));
            joined.push((score.max_score, values));
        }
    }
    joined.sort_by(|a, b| b.0.total_cmp(&a.0));

    Ok(Table {
        columns,
        rows: joined.into_iter().map(|(_, row)| row).collect(),
    })
}
