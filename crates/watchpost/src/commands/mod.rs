pub mod analyze;
pub mod cases;
pub mod rebuild_index;
pub mod repair;
pub mod run;
pub mod search;
pub mod stats;
pub mod version;

use std::sync::Arc;
use tracing::warn;
use watchpost_core::{PipelineConfig, ResultHistory};
use watchpost_index::{embedder_for, BuildOptions, Retriever};
use watchpost_models::OpenAiCompatClient;
use watchpost_pipeline::{CycleSettings, Orchestrator};
use watchpost_telemetry::Paths;

pub type LiveOrchestrator = Orchestrator<OpenAiCompatClient, OpenAiCompatClient, Retriever>;

/// Data root and configuration shared by every command
pub struct Context {
    pub paths: Paths,
    pub config: PipelineConfig,
}

impl Context {
    pub fn load() -> anyhow::Result<Self> {
        let paths = Paths::new()?;
        paths.ensure_dirs()?;
        let config = PipelineConfig::load(&paths);
        config.validate()?;
        Ok(Self { paths, config })
    }

    /// Retriever over the knowledge index; the embedder loads on first query
    pub fn retriever(&self) -> Retriever {
        let config = self.config.clone();
        Retriever::new(
            self.paths.index_path(),
            self.config.query_instruction.clone(),
            Box::new(move || embedder_for(&config)),
        )
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            max_chars: self.config.chunk_max_chars,
            batch_size: self.config.embed_batch_size,
        }
    }

    pub fn orchestrator(&self, retriever: Arc<Retriever>) -> anyhow::Result<LiveOrchestrator> {
        let config = &self.config;
        if config.api_key.is_none() {
            warn!("no API key configured, model calls will fail");
        }
        let vision = OpenAiCompatClient::new(
            &config.base_url,
            config.api_key.clone(),
            &config.vision_model,
            config.vision_temperature,
            config.vision_timeout(),
        )?;
        let reasoning = OpenAiCompatClient::new(
            &config.base_url,
            config.api_key.clone(),
            &config.reasoning_model,
            config.reasoning_temperature,
            config.reasoning_timeout(),
        )?;

        let orchestrator = Orchestrator::new(
            vision,
            reasoning,
            retriever,
            Arc::new(ResultHistory::new(config.history_capacity)),
            CycleSettings::from_config(config),
        );
        Ok(if config.log_raw_outputs {
            orchestrator.with_raw_log(self.paths.raw_outputs_file())
        } else {
            orchestrator
        })
    }
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}
