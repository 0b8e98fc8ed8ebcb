//! Error types for the retail copilot.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CopilotError {
    #[error("documents directory not found: {0}")]
    DocsDirMissing(String),

    #[error("no usable document chunks found in {0}")]
    EmptyCorpus(String),

    #[error("database not found: {0}")]
    DbMissing(String),

    #[error("generation service error: {0}")]
    Generator(String),

    #[error("invalid batch record at line {line}: {reason}")]
    Record { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
