use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("index database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("unknown embedding model: {0}")]
    UnknownModel(String),

    #[error("no markdown documents found in {0}")]
    EmptyCorpus(PathBuf),

    #[error("index is corrupt: {0}")]
    Corrupt(String),

    #[error("vector dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
