//! Error types for the doxgen core library.

use std::path::PathBuf;

/// Top-level error enum for the doxgen core library.
#[derive(Debug, thiserror::Error)]
pub enum DoxError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Cannot read source root {path}: {message}")]
    DiscoveryRoot { path: PathBuf, message: String },

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("file too large: {size} bytes exceeds limit of {limit}")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DoxError {
    /// True for failures that will not go away by retrying the same file
    /// with the same toolchain (no grammar for its language).
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DoxError::UnsupportedLanguage(_))
    }
}

pub type DoxResult<T> = Result<T, DoxError>;
