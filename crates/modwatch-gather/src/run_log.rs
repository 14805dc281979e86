//! Run-scoped operations log.
//!
//! Any worker may call [`RunLog::log`]; the record is queued and returns
//! immediately. A single writer task owns the file and drains the queue in
//! order. [`RunLog::stop`] flushes everything queued before it was called.
//! Every record is mirrored to `tracing` at the matching level.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARNING",
            Level::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub worker: String,
    pub entity: String,
    pub level: Level,
    pub message: String,
}

impl LogRecord {
    /// `<timestamp> - WORKER: <id> - ENTITY: <entity> - LEVEL: <level> - MESSAGE: <message>`
    #[must_use]
    pub fn format_line(&self) -> String {
        format!(
            "{} - WORKER: {} - ENTITY: {} - LEVEL: {} - MESSAGE: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S,%3f"),
            self.worker,
            self.entity,
            self.level.as_str(),
            self.message
        )
    }
}

enum Message {
    Record(LogRecord),
    Stop,
}

enum Target {
    File(BufWriter<tokio::fs::File>),
    Memory(Arc<Mutex<Vec<String>>>),
}

impl Target {
    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        match self {
            Target::File(file) => {
                file.write_all(line.as_bytes()).await?;
                file.write_all(b"\n").await
            }
            Target::Memory(lines) => {
                lines.lock().push(line.to_string());
                Ok(())
            }
        }
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Target::File(file) => file.flush().await,
            Target::Memory(_) => Ok(()),
        }
    }
}

/// Handle to the run log. Cheap to clone; all clones feed one writer.
#[derive(Clone)]
pub struct RunLog {
    tx: mpsc::UnboundedSender<Message>,
    writer: Arc<Mutex<Option<JoinHandle<std::io::Result<()>>>>>,
    path: Option<Arc<PathBuf>>,
}

impl RunLog {
    /// Creates `gather_operations_<YYYYmmdd_HHMMSS>.log` under `dir` and
    /// starts the writer task.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or file cannot be created.
    pub async fn create(dir: &Path) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let name = format!(
            "gather_operations_{}.log",
            Local::now().format("%Y%m%d_%H%M%S")
        );
        Self::to_file(&dir.join(name)).await
    }

    /// Appends to `path`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened.
    pub async fn to_file(path: &Path) -> std::io::Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::spawn(
            Target::File(BufWriter::new(file)),
            Some(path.to_path_buf()),
        ))
    }

    /// A log kept in memory; returns the shared line buffer.
    #[must_use]
    pub fn in_memory() -> (Self, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        (Self::spawn(Target::Memory(Arc::clone(&lines)), None), lines)
    }

    fn spawn(mut target: Target, path: Option<PathBuf>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Record(record) => target.write_line(&record.format_line()).await?,
                    Message::Stop => break,
                }
            }
            target.flush().await
        });
        Self {
            tx,
            writer: Arc::new(Mutex::new(Some(writer))),
            path: path.map(Arc::new),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    /// Queues a record. Never blocks on I/O.
    pub fn log(&self, level: Level, worker: &str, entity: &str, message: impl Into<String>) {
        let message = message.into();
        match level {
            Level::Debug => tracing::debug!(worker, entity, "{message}"),
            Level::Info => tracing::info!(worker, entity, "{message}"),
            Level::Warn => tracing::warn!(worker, entity, "{message}"),
            Level::Error => tracing::error!(worker, entity, "{message}"),
        }
        let record = LogRecord {
            timestamp: Local::now(),
            worker: worker.to_string(),
            entity: entity.to_string(),
            level,
            message,
        };
        // A closed channel means the writer already stopped.
        let _ = self.tx.send(Message::Record(record));
    }

    /// Drains every record queued so far, then closes the file. Later calls
    /// return immediately.
    ///
    /// # Errors
    ///
    /// Returns the writer's I/O error, if any.
    pub async fn stop(&self) -> std::io::Result<()> {
        let _ = self.tx.send(Message::Stop);
        let handle = self.writer.lock().take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| std::io::Error::other(format!("log writer task failed: {e}")))?,
            None => Ok(()),
        }
    }
}
