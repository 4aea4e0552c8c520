use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use watchpost_core::{FrameError, ValidationError};
use watchpost_models::ModelError;

/// Why a cycle ended before any vision facts were acquired
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] FrameError),

    #[error("vision call timed out after {0:?}")]
    VisionTimeout(Duration),

    #[error("vision call failed: {0}")]
    Vision(#[from] ModelError),

    #[error("vision output could not be parsed")]
    UnparseableVision,

    #[error("vision output failed validation: {0}")]
    InvalidVision(#[from] ValidationError),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("frame source not available: {0}")]
    Unavailable(PathBuf),

    #[error("frame source I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode frame: {0}")]
    Decode(#[from] FrameError),

    #[error("frame source task failed: {0}")]
    Task(String),
}
