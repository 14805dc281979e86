use modwatch_core::{TableError, TableKind};
use modwatch_gather::GatherError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("{kind} table is missing required columns: {}", missing.join(", "))]
    MissingColumns { kind: TableKind, missing: Vec<String> },

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("sink error: {0}")]
    Sink(#[from] GatherError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid response schema: {0}")]
    InvalidSchema(String),
}

/// Fails with [`ReviewError::MissingColumns`] unless `table` has every name.
pub(crate) fn require_columns(
    table: &modwatch_core::Table,
    kind: TableKind,
    names: &[&str],
) -> Result<(), ReviewError> {
    let missing: Vec<String> = names
        .iter()
        .filter(|name| table.column_index(name).is_none())
        .map(ToString::to_string)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ReviewError::MissingColumns { kind, missing })
    }
}
