//! Append-only tabular files.
//!
//! A table file holds a header row followed by data rows, one JSON array per
//! line. Values in a data row follow the header's column order. Rows are never
//! rewritten or de-duplicated once appended.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde_json::Value;

use crate::error::TableError;

/// A row keyed by column name.
pub type Record = serde_json::Map<String, Value>;

/// An in-memory table loaded from disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Read a table file.
    ///
    /// # Errors
    ///
    /// Returns [`TableError`] if the file cannot be read, is empty, or a line
    /// is not a JSON array.
    pub fn read(path: &Path) -> Result<Self, TableError> {
        let content = std::fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Read the header row only, without loading the rest of the file.
    /// `Ok(None)` when the file does not exist or holds no lines.
    ///
    /// # Errors
    ///
    /// Returns [`TableError`] on I/O failure or a malformed header line.
    pub fn read_header(path: &Path) -> Result<Option<Vec<String>>, TableError> {
        let io_err = |source| TableError::Io {
            path: path.display().to_string(),
            source,
        };
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(e)),
        };
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(&line)
                .map(Some)
                .map_err(|source| TableError::Malformed {
                    path: path.display().to_string(),
                    line: idx + 1,
                    source,
                });
        }
        Ok(None)
    }

    fn parse(content: &str, path: &str) -> Result<Self, TableError> {
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, header) = lines.next().ok_or_else(|| TableError::MissingHeader {
            path: path.to_string(),
        })?;
        let columns: Vec<String> =
            serde_json::from_str(header).map_err(|source| TableError::Malformed {
                path: path.to_string(),
                line: 1,
                source,
            })?;

        let mut rows = Vec::new();
        for (idx, line) in lines {
            let row: Vec<Value> =
                serde_json::from_str(line).map_err(|source| TableError::Malformed {
                    path: path.to_string(),
                    line: idx + 1,
                    source,
                })?;
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    /// Position of a column in the header.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Fails with [`TableError::MissingColumns`] unless every name is present.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn require_columns(&self, path: &Path, names: &[&str]) -> Result<(), TableError> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .map(ToString::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TableError::MissingColumns {
                path: path.display().to_string(),
                missing,
            })
        }
    }

    /// Rows converted to name-keyed records. Short rows yield `null` for the
    /// trailing columns.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| (column.clone(), row.get(i).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect()
    }

    pub fn push_record(&mut self, record: &Record) {
        self.rows.push(project(record, &self.columns));
    }

    /// Replace the file with this table's contents.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Io`] on write failure.
    pub fn write(&self, path: &Path) -> Result<(), TableError> {
        let io_err = |source| TableError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut out = encode_line(&self.columns);
        for row in &self.rows {
            out.push_str(&encode_line(row));
        }
        std::fs::write(path, out).map_err(io_err)
    }
}

/// Append records to a table file, writing `columns` as the header first if
/// the file is new or empty.
///
/// # Errors
///
/// Returns [`TableError::Io`] on write failure.
pub fn append_records(path: &Path, columns: &[String], records: &[Record]) -> Result<(), TableError> {
    let io_err = |source| TableError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let needs_header = Table::read_header(path)?.is_none();

    let mut out = String::new();
    if needs_header {
        out.push_str(&encode_line(columns));
    }
    for record in records {
        out.push_str(&encode_line(&project(record, columns)));
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(out.as_bytes()).map_err(io_err)
}

/// Values of `record` in `columns` order; absent columns become `null`.
#[must_use]
pub fn project(record: &Record, columns: &[String]) -> Vec<Value> {
    columns
        .iter()
        .map(|column| record.get(column).cloned().unwrap_or(Value::Null))
        .collect()
}

/// One newline-terminated table line.
#[must_use]
pub fn encode_line<T: serde::Serialize + ?Sized>(row: &T) -> String {
    // Serializing strings and JSON values into a Vec cannot fail.
    let mut line = serde_json::to_string(row).unwrap_or_else(|_| "[]".to_string());
    line.push('\n');
    line
}

/// Looks up a string cell, treating `null` as absent.
#[must_use]
pub fn str_field<'a>(record: &'a Record, column: &str) -> Option<&'a str> {
    record.get(column).and_then(Value::as_str)
}
