//! Audit record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which model call produced a raw output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStage {
    Vision,
    Reasoning,
}

/// One raw model response, logged before any repair is attempted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOutputRecord {
    pub timestamp: DateTime<Utc>,
    pub stage: ModelStage,
    pub model: String,
    pub raw: String,
    #[serde(default)]
    pub frame_sequence: Option<u64>,
    /// Whether the text parsed as JSON without any repair
    #[serde(default)]
    pub parsed_directly: bool,
}

impl RawOutputRecord {
    pub fn new(stage: ModelStage, model: &str, raw: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            stage,
            model: model.to_string(),
            raw: raw.to_string(),
            frame_sequence: None,
            parsed_directly: serde_json::from_str::<serde_json::Value>(raw.trim()).is_ok(),
        }
    }

    pub fn with_frame(mut self, sequence: u64) -> Self {
        self.frame_sequence = Some(sequence);
        self
    }
}
