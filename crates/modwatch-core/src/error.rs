use thiserror::Error;

/// Errors raised while loading environment or targeting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("configuration validation failed: {0}")]
    Validation(String),

    #[error("failed to read targeting file {path}: {source}")]
    TargetingFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse targeting file: {0}")]
    TargetingFileParse(#[from] serde_yaml::Error),
}

/// Errors raised while reading or writing a table file.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("table I/O error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed table {path} at line {line}: {source}")]
    Malformed {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("table {path} has no header row")]
    MissingHeader { path: String },

    #[error("table {path} is missing required columns: {}", missing.join(", "))]
    MissingColumns { path: String, missing: Vec<String> },
}
