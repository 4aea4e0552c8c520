//! Data model, configuration and the deterministic decision rules of the
//! perception-to-decision pipeline

mod buffer;
mod config;
mod frame;
mod history;
mod rules;
mod types;
mod validate;

pub use buffer::FrameBuffer;
pub use config::{ConfigError, EmbedderKind, PipelineConfig, API_KEY_ENVS, BASE_URL_ENV};
pub use frame::{Frame, FrameError};
pub use history::ResultHistory;
pub use rules::{decide, fallback_result, Rule, Verdict, FALLBACK_MODEL};
pub use types::{
    case_id_for, AlarmLevel, AlarmSummary, Analysis, BadgeStatus, Case, Decision,
    DecisionSource, DocKind, ReasoningResult, ResultMetadata, RetrievalCounts,
    RetrievedDocument, VisionFacts,
};
pub use validate::{clamp_confidence, ValidationError, DEFAULT_CONFIDENCE};
