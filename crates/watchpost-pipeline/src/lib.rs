//! The running pipeline: ingestion, single-flight dispatch, the two-stage
//! inference cycle and result publication

mod dispatcher;
mod error;
mod ingest;
mod orchestrator;
mod publish;

pub use dispatcher::{CycleRunner, Dispatch, InferenceDispatcher};
pub use error::{CycleError, SourceError};
pub use ingest::{DirectoryFrameSource, FrameSource, IngestSettings, IngestStats, Ingestor};
pub use orchestrator::{CycleReport, CycleSettings, KnowledgeSource, Orchestrator};
pub use publish::{JsonlNotifier, LogNotifier, Notifier, Publisher};
