use thiserror::Error;
use watchpost_core::FrameError;
use watchpost_index::IndexError;

#[derive(Debug, Error)]
pub enum CaseError {
    #[error("case I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode case: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to save snapshot: {0}")]
    Snapshot(#[from] FrameError),

    #[error("failed to list corpus: {0}")]
    Index(#[from] IndexError),

    #[error("case not found: {0}")]
    NotFound(String),

    #[error("invalid case id: {0:?}")]
    InvalidId(String),
}
