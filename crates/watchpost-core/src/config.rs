//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use watchpost_telemetry::Paths;

/// Checked in order; the first non-empty value wins
pub const API_KEY_ENVS: [&str; 2] = ["WATCHPOST_API_KEY", "DASHSCOPE_API_KEY"];
pub const BASE_URL_ENV: &str = "WATCHPOST_BASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which text embedder backs the knowledge index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// ONNX sentence embeddings via fastembed
    FastEmbed,
    /// Dependency-free feature hashing, usable offline
    Hashing,
}

/// Runtime configuration. Durations are stored as seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum time between inference starts
    pub infer_interval_secs: f64,

    /// OpenAI-compatible endpoint serving both models
    pub base_url: String,

    /// Never written back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub vision_model: String,
    pub vision_temperature: f32,
    /// Vision call budget; expiry aborts the cycle
    pub vision_timeout_secs: f64,

    pub reasoning_model: String,
    pub reasoning_temperature: f32,
    /// Reasoning call budget; expiry falls back to the rule engine
    pub reasoning_timeout_secs: f64,

    /// Retrieval hits passed to the reasoning prompt
    pub top_k: usize,
    /// Minimum similarity in [0, 1]
    pub similarity_threshold: f32,
    /// Prefix prepended to retrieval queries
    pub query_instruction: String,
    pub embedder: EmbedderKind,
    pub embedding_model: String,
    pub chunk_max_chars: usize,
    pub embed_batch_size: usize,

    pub history_capacity: usize,
    /// Pending notifications before new ones are dropped
    pub notify_queue: usize,

    /// Quiet period that coalesces bursts of new cases
    pub reindex_debounce_secs: f64,
    /// Wait between a finished rebuild and the retriever refresh
    pub refresh_grace_secs: f64,

    /// No frame for this long counts as a stalled stream
    pub stall_timeout_secs: f64,
    pub reconnect_initial_secs: f64,
    pub reconnect_max_secs: f64,
    /// Keep one decoded frame out of every `frame_stride`
    pub frame_stride: u32,
    pub source_poll_ms: u64,

    pub infer_width: u32,
    pub infer_height: u32,
    pub jpeg_quality: u8,

    /// Append every raw model response to the audit log
    pub log_raw_outputs: bool,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self {
            infer_interval_secs: 2.0,
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            api_key: None,
            vision_model: "qwen-vl-max".to_string(),
            vision_temperature: 0.1,
            vision_timeout_secs: 30.0,
            reasoning_model: "qwen3-max".to_string(),
            reasoning_temperature: 0.2,
            reasoning_timeout_secs: 60.0,
            top_k: 3,
            similarity_threshold: 0.3,
            query_instruction: "为这个句子生成表示以用于检索相关文章：".to_string(),
            embedder: EmbedderKind::FastEmbed,
            embedding_model: "bge-small-zh-v1.5".to_string(),
            chunk_max_chars: 500,
            embed_batch_size: 32,
            history_capacity: 100,
            notify_queue: 64,
            reindex_debounce_secs: 5.0,
            refresh_grace_secs: 2.0,
            stall_timeout_secs: 5.0,
            reconnect_initial_secs: 3.0,
            reconnect_max_secs: 60.0,
            frame_stride: 2,
            source_poll_ms: 200,
            infer_width: 640,
            infer_height: 360,
            jpeg_quality: 80,
            log_raw_outputs: true,
        }
    }

    /// Load `watchpost.json` from the data root, falling back to defaults
    /// when it is absent or unreadable, then apply environment overrides.
    pub fn load(paths: &Paths) -> Self {
        let path = paths.config_file();
        let mut config = if path.exists() {
            match Self::from_file(&path) {
                Ok(config) => config,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "ignoring config file");
                    Self::new()
                }
            }
        } else {
            Self::new()
        };
        config.apply_env();
        config
    }

    /// Strict load of one config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        let from_env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(key) = API_KEY_ENVS.iter().find_map(|name| from_env(*name)) {
            self.api_key = Some(key);
        }
        if let Some(url) = from_env(BASE_URL_ENV) {
            self.base_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.top_k == 0 {
            return invalid("top_k must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return invalid("similarity_threshold must be within [0, 1]");
        }
        if self.frame_stride == 0 {
            return invalid("frame_stride must be at least 1");
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return invalid("jpeg_quality must be within 1..=100");
        }
        if self.infer_width == 0 || self.infer_height == 0 {
            return invalid("inference size must be non-zero");
        }
        if self.chunk_max_chars == 0 || self.embed_batch_size == 0 {
            return invalid("chunk_max_chars and embed_batch_size must be non-zero");
        }
        if self.reconnect_initial_secs > self.reconnect_max_secs {
            return invalid("reconnect_initial_secs exceeds reconnect_max_secs");
        }
        Ok(())
    }

    pub fn infer_interval(&self) -> Duration {
        secs(self.infer_interval_secs)
    }

    pub fn vision_timeout(&self) -> Duration {
        secs(self.vision_timeout_secs)
    }

    pub fn reasoning_timeout(&self) -> Duration {
        secs(self.reasoning_timeout_secs)
    }

    pub fn reindex_debounce(&self) -> Duration {
        secs(self.reindex_debounce_secs)
    }

    pub fn refresh_grace(&self) -> Duration {
        secs(self.refresh_grace_secs)
    }

    pub fn stall_timeout(&self) -> Duration {
        secs(self.stall_timeout_secs)
    }

    pub fn reconnect_initial(&self) -> Duration {
        secs(self.reconnect_initial_secs)
    }

    pub fn reconnect_max(&self) -> Duration {
        secs(self.reconnect_max_secs)
    }

    pub fn source_poll(&self) -> Duration {
        Duration::from_millis(self.source_poll_ms.max(1))
    }

    pub fn infer_size(&self) -> (u32, u32) {
        (self.infer_width, self.infer_height)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
