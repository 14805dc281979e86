//! [`BatchSink`] implementations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use modwatch_core::table::{encode_line, project};
use modwatch_core::{Record, Table, TableError, TableKind};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::traits::BatchSink;
use crate::GatherError;

const KINDS: [TableKind; 6] = [
    TableKind::Posts,
    TableKind::Comments,
    TableKind::Conversations,
    TableKind::Perspectives,
    TableKind::Ranked,
    TableKind::Assessments,
];

/// Table files under one data directory, one lock per kind.
///
/// Each lock also remembers whether the kind's header row is known to be on
/// disk, so appends after the first never re-read the file. The sink assumes
/// it is the only writer of its directory while it lives.
pub struct TableSink {
    dir: PathBuf,
    headers: HashMap<TableKind, tokio::sync::Mutex<bool>>,
}

impl TableSink {
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            headers: KINDS
                .iter()
                .map(|kind| (*kind, tokio::sync::Mutex::new(false)))
                .collect(),
        }
    }

    #[must_use]
    pub fn path_for(&self, kind: TableKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    fn io_error(&self, kind: TableKind, source: std::io::Error) -> GatherError {
        GatherError::Sink {
            kind,
            source: TableError::Io {
                path: self.path_for(kind).display().to_string(),
                source,
            },
        }
    }

    async fn append_text(&self, kind: TableKind, text: &str) -> Result<(), GatherError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.io_error(kind, e))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(kind))
            .await
            .map_err(|e| self.io_error(kind, e))?;
        file.write_all(text.as_bytes())
            .await
            .map_err(|e| self.io_error(kind, e))?;
        file.flush().await.map_err(|e| self.io_error(kind, e))
    }

    async fn read_header(&self, kind: TableKind) -> Result<Option<Vec<String>>, GatherError> {
        let path = self.path_for(kind);
        match tokio::task::spawn_blocking(move || Table::read_header(&path)).await {
            Ok(read) => read.map_err(|source| GatherError::Sink { kind, source }),
            Err(e) => Err(self.io_error(kind, std::io::Error::other(e))),
        }
    }

    async fn lock(
        &self,
        kind: TableKind,
    ) -> Result<tokio::sync::MutexGuard<'_, bool>, GatherError> {
        match self.headers.get(&kind) {
            Some(lock) => Ok(lock.lock().await),
            None => Err(self.io_error(
                kind,
                std::io::Error::other("no table file for this kind"),
            )),
        }
    }
}

#[async_trait]
impl BatchSink for TableSink {
    async fn ensure_header(
        &self,
        kind: TableKind,
        default_columns: &[String],
    ) -> Result<Vec<String>, GatherError> {
        let mut header_written = self.lock(kind).await?;
        if let Some(existing) = self.read_header(kind).await? {
            *header_written = true;
            return Ok(existing);
        }
        self.append_text(kind, &encode_line(default_columns)).await?;
        *header_written = true;
        Ok(default_columns.to_vec())
    }

    async fn append_rows(
        &self,
        kind: TableKind,
        rows: &[Record],
        columns: &[String],
    ) -> Result<(), GatherError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut text = String::new();
        for row in rows {
            text.push_str(&encode_line(&project(row, columns)));
        }
        let mut header_written = self.lock(kind).await?;
        if !*header_written && self.read_header(kind).await?.is_none() {
            text.insert_str(0, &encode_line(columns));
        }
        self.append_text(kind, &text).await?;
        *header_written = true;
        Ok(())
    }
}

/// One `append_rows` call captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Push {
    pub kind: TableKind,
    pub rows: Vec<Vec<Value>>,
    pub columns: Vec<String>,
}

/// In-memory sink recording every push.
#[derive(Default)]
pub struct MemorySink {
    headers: Mutex<HashMap<TableKind, Vec<String>>>,
    pushes: Mutex<Vec<Push>>,
    fail_appends: bool,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose appends always fail.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_appends: true,
            ..Self::default()
        }
    }

    /// Pre-seeds the header row of `kind`.
    #[must_use]
    pub fn with_header(self, kind: TableKind, columns: Vec<String>) -> Self {
        self.headers.lock().insert(kind, columns);
        self
    }

    #[must_use]
    pub fn pushes(&self) -> Vec<Push> {
        self.pushes.lock().clone()
    }

    #[must_use]
    pub fn pushes_of(&self, kind: TableKind) -> Vec<Push> {
        self.pushes
            .lock()
            .iter()
            .filter(|p| p.kind == kind)
            .cloned()
            .collect()
    }

    /// All rows of `kind` as a table under the recorded header.
    #[must_use]
    pub fn table(&self, kind: TableKind) -> Table {
        let columns = self.headers.lock().get(&kind).cloned().unwrap_or_default();
        let rows = self
            .pushes_of(kind)
            .into_iter()
            .flat_map(|p| p.rows)
            .collect();
        Table { columns, rows }
    }
}

#[async_trait]
impl BatchSink for MemorySink {
    async fn ensure_header(
        &self,
        kind: TableKind,
        default_columns: &[String],
    ) -> Result<Vec<String>, GatherError> {
        Ok(self
            .headers
            .lock()
            .entry(kind)
            .or_insert_with(|| default_columns.to_vec())
            .clone())
    }

    async fn append_rows(
        &self,
        kind: TableKind,
        rows: &[Record],
        columns: &[String],
    ) -> Result<(), GatherError> {
        if self.fail_appends {
            return Err(GatherError::Sink {
                kind,
                source: TableError::Io {
                    path: format!("memory://{kind}"),
                    source: std::io::Error::other("sink unavailable"),
                },
            });
        }
        self.pushes.lock().push(Push {
            kind,
            rows: rows.iter().map(|r| project(r, columns)).collect(),
            columns: columns.to_vec(),
        });
        Ok(())
    }
}
