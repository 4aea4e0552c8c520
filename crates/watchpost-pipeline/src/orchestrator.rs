//! The two-stage inference cycle: vision, retrieval, reasoning, decision

use crate::dispatcher::CycleRunner;
use crate::error::CycleError;
use crate::publish::Publisher;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use watchpost_cases::{CaseStore, StoredCase};
use watchpost_core::{
    fallback_result, AlarmSummary, Case, Frame, PipelineConfig, ReasoningResult, ResultHistory,
    RetrievalCounts, RetrievedDocument, VisionFacts,
};
use watchpost_index::Retriever;
use watchpost_models::{reasoning_prompt, ReasoningModel, VisionModel, VISION_PROMPT};
use watchpost_repair::{recover_with, try_recover_with, Stage};
use watchpost_telemetry::{append_jsonl, ModelStage, RawOutputRecord};

/// Evidence lookup used by the retrieval step. Never fails; problems yield
/// no documents.
pub trait KnowledgeSource: Send + Sync + 'static {
    fn query(&self, text: &str, top_k: usize, threshold: f32) -> Vec<RetrievedDocument>;
}

impl KnowledgeSource for Retriever {
    fn query(&self, text: &str, top_k: usize, threshold: f32) -> Vec<RetrievedDocument> {
        Retriever::query(self, text, top_k, threshold)
    }
}

/// Per-cycle budgets and encoding parameters
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub vision_timeout: Duration,
    pub reasoning_timeout: Duration,
    pub top_k: usize,
    pub threshold: f32,
    pub infer_size: (u32, u32),
    pub jpeg_quality: u8,
}

impl CycleSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            vision_timeout: config.vision_timeout(),
            reasoning_timeout: config.reasoning_timeout(),
            top_k: config.top_k,
            threshold: config.similarity_threshold,
            infer_size: config.infer_size(),
            jpeg_quality: config.jpeg_quality,
        }
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::new())
    }
}

/// Everything one completed cycle produced
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub summary: AlarmSummary,
    pub result: ReasoningResult,
    pub facts: VisionFacts,
    pub documents: Vec<RetrievedDocument>,
    pub case: Option<StoredCase>,
    /// Set when the rule engine decided instead of the reasoning model
    pub fallback_reason: Option<String>,
}

pub struct Orchestrator<V, R, K> {
    vision: V,
    reasoning: R,
    knowledge: Arc<K>,
    history: Arc<ResultHistory>,
    settings: CycleSettings,
    cases: Option<Arc<CaseStore>>,
    publisher: Option<Publisher>,
    raw_log: Option<PathBuf>,
}

impl<V, R, K> Orchestrator<V, R, K>
where
    V: VisionModel,
    R: ReasoningModel,
    K: KnowledgeSource,
{
    pub fn new(
        vision: V,
        reasoning: R,
        knowledge: Arc<K>,
        history: Arc<ResultHistory>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            vision,
            reasoning,
            knowledge,
            history,
            settings,
            cases: None,
            publisher: None,
            raw_log: None,
        }
    }

    /// Persist actionable decisions as cases
    pub fn with_cases(mut self, cases: Arc<CaseStore>) -> Self {
        self.cases = Some(cases);
        self
    }

    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Append every raw model response to `path`
    pub fn with_raw_log(mut self, path: PathBuf) -> Self {
        self.raw_log = Some(path);
        self
    }

    pub fn history(&self) -> &Arc<ResultHistory> {
        &self.history
    }

    /// Run one cycle over `frame`.
    ///
    /// Fails only before vision facts are acquired; every later problem
    /// degrades to the rule engine and the cycle still publishes.
    pub async fn run_cycle(&self, frame: Frame) -> Result<CycleReport, CycleError> {
        let sequence = frame.sequence();
        let facts = self.perceive(&frame).await?;
        debug!(
            sequence,
            has_person = facts.has_person,
            badge = facts.badge_status.as_str(),
            "vision facts acquired"
        );

        let documents = self.retrieve(&facts).await;
        let counts = RetrievalCounts::from_documents(&documents);
        info!(
            sequence,
            total = counts.total,
            rules = counts.rules,
            cases = counts.cases,
            "knowledge retrieved"
        );

        let (result, fallback_reason) = match self.reason(&facts, &documents, counts, sequence).await {
            Ok(result) => (result, None),
            Err(reason) => {
                warn!(sequence, %reason, "using fallback rule engine");
                (fallback_result(&facts, counts), Some(reason))
            }
        };

        let case = if result.is_actionable() {
            self.persist(&frame, &facts, &result).await
        } else {
            None
        };

        let summary = AlarmSummary::new(&facts, &result, case.as_ref().map(|c| c.case_id.clone()))
            .with_frame(sequence);
        self.history.push(summary.clone());
        if let Some(publisher) = &self.publisher {
            publisher.publish(summary.clone());
        }

        Ok(CycleReport {
            summary,
            result,
            facts,
            documents,
            case,
            fallback_reason,
        })
    }

    async fn perceive(&self, frame: &Frame) -> Result<VisionFacts, CycleError> {
        let image = frame.to_data_url(Some(self.settings.infer_size), self.settings.jpeg_quality)?;
        let call = self.vision.describe(VISION_PROMPT, &image);
        let raw = timeout(self.settings.vision_timeout, call)
            .await
            .map_err(|_| CycleError::VisionTimeout(self.settings.vision_timeout))??;
        self.log_raw(ModelStage::Vision, self.vision.name(), &raw, frame.sequence())
            .await;

        let recovery =
            try_recover_with(&raw, self.vision.name()).ok_or(CycleError::UnparseableVision)?;
        if !recovery.applied.is_empty() {
            debug!(passes = ?recovery.applied, "vision output repaired");
        }
        Ok(VisionFacts::from_value(&recovery.value)?)
    }

    async fn retrieve(&self, facts: &VisionFacts) -> Vec<RetrievedDocument> {
        let query = facts.retrieval_query();
        let knowledge = Arc::clone(&self.knowledge);
        let (top_k, threshold) = (self.settings.top_k, self.settings.threshold);
        match tokio::task::spawn_blocking(move || knowledge.query(&query, top_k, threshold)).await {
            Ok(documents) => documents,
            Err(err) => {
                warn!(error = %err, "retrieval task failed, continuing without evidence");
                Vec::new()
            }
        }
    }

    /// The validated reasoning result, or why the rule engine must decide
    async fn reason(
        &self,
        facts: &VisionFacts,
        documents: &[RetrievedDocument],
        counts: RetrievalCounts,
        sequence: u64,
    ) -> Result<ReasoningResult, String> {
        let model = self.reasoning.name();
        let prompt = reasoning_prompt(facts, documents, model);
        let raw = match timeout(self.settings.reasoning_timeout, self.reasoning.reason(&prompt)).await
        {
            Err(_) => {
                return Err(format!(
                    "reasoning call timed out after {:?}",
                    self.settings.reasoning_timeout
                ))
            }
            Ok(Err(err)) => return Err(format!("reasoning call failed: {}", err)),
            Ok(Ok(raw)) => raw,
        };
        self.log_raw(ModelStage::Reasoning, model, &raw, sequence).await;

        let recovery = recover_with(&raw, model);
        if recovery.stage == Stage::Default {
            return Err("reasoning output could not be parsed".to_string());
        }
        if !recovery.applied.is_empty() {
            debug!(passes = ?recovery.applied, stage = ?recovery.stage, "reasoning output repaired");
        }
        ReasoningResult::from_model_output(&recovery.value, model, counts)
            .map_err(|err| format!("reasoning output failed validation: {}", err))
    }

    async fn persist(
        &self,
        frame: &Frame,
        facts: &VisionFacts,
        result: &ReasoningResult,
    ) -> Option<StoredCase> {
        let cases = Arc::clone(self.cases.as_ref()?);
        let frame = frame.clone();
        let case = Case::new(facts.clone(), result.clone());
        let quality = self.settings.jpeg_quality;

        let task = tokio::task::spawn_blocking(move || {
            cases.add_case_with_snapshot(case, &frame, quality)
        });

        match task.await {
            Ok(Ok(stored)) => {
                info!(case_id = %stored.case_id, "case written");
                Some(stored)
            }
            Ok(Err(err)) => {
                error!(error = %err, "failed to persist case");
                None
            }
            Err(err) => {
                error!(error = %err, "case persistence task failed");
                None
            }
        }
    }

    async fn log_raw(&self, stage: ModelStage, model: &str, raw: &str, sequence: u64) {
        let Some(path) = self.raw_log.clone() else {
            return;
        };
        let record = RawOutputRecord::new(stage, model, raw).with_frame(sequence);
        let task = tokio::task::spawn_blocking(move || {
            append_jsonl(&path, &record).map_err(|err| (path, err))
        });
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err((path, err))) => {
                warn!(path = %path.display(), error = %err, "failed to log raw model output")
            }
            Err(err) => warn!(error = %err, "raw output logging task failed"),
        }
    }
}

impl<V, R, K> CycleRunner for Orchestrator<V, R, K>
where
    V: VisionModel + 'static,
    R: ReasoningModel + 'static,
    K: KnowledgeSource,
{
    async fn run(&self, frame: Frame) {
        let sequence = frame.sequence();
        match self.run_cycle(frame).await {
            Ok(report) => info!(
                sequence,
                alarm = report.summary.is_alarm,
                level = %report.summary.alarm_level,
                source = ?report.summary.source,
                "cycle complete"
            ),
            Err(err) => warn!(sequence, error = %err, "cycle aborted"),
        }
    }
}
