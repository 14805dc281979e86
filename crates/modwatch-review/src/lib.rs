//! Post-collection stages: conversation composition, toxicity scoring of
//! whole conversations, ranking, and generative assessment.

pub mod assess;
pub mod compose;
pub mod deliberate;
pub mod error;
pub mod rank;

pub use assess::{assess_conversations, perspective_columns, AssessReport, AssessSettings};
pub use compose::{compose_conversations, conversations_table, Conversation};
pub use deliberate::{
    assessment_columns, deliberate, load_instruction, load_schema, DeliberateReport,
    DeliberateSettings, Generator,
};
pub use error::ReviewError;
pub use rank::{max_scores, rank_conversations, MaxScore};

/// An identifier cell as text. Ids may be stored as strings or numbers.
pub(crate) fn id_cell(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The first `max_chars` characters of `text`.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
