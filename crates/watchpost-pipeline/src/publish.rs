//! Best-effort fan-out of results to notifiers

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use watchpost_core::AlarmSummary;
use watchpost_telemetry::append_jsonl;

/// Receives every published result. Failures are logged and never retried.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn notify(&self, summary: &AlarmSummary) -> anyhow::Result<()>;
}

/// Writes each result as a structured log event
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, summary: &AlarmSummary) -> anyhow::Result<()> {
        if summary.is_alarm {
            warn!(
                level = %summary.alarm_level,
                reason = %summary.alarm_reason,
                confidence = summary.confidence,
                case_id = summary.case_id.as_deref().unwrap_or("-"),
                model = %summary.model,
                "ALARM"
            );
        } else {
            info!(
                reason = %summary.alarm_reason,
                confidence = summary.confidence,
                model = %summary.model,
                "no alarm"
            );
        }
        Ok(())
    }
}

/// Appends each result to a JSONL feed
pub struct JsonlNotifier {
    path: PathBuf,
}

impl JsonlNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Notifier for JsonlNotifier {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn notify(&self, summary: &AlarmSummary) -> anyhow::Result<()> {
        append_jsonl(&self.path, summary)?;
        Ok(())
    }
}

/// Handle to the publisher task. Publishing never blocks: when the queue is
/// full the result is dropped.
#[derive(Clone)]
pub struct Publisher {
    tx: mpsc::Sender<AlarmSummary>,
}

impl Publisher {
    /// Start the draining task on the blocking pool
    pub fn spawn(notifiers: Vec<Arc<dyn Notifier>>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AlarmSummary>(capacity.max(1));
        let task = tokio::task::spawn_blocking(move || {
            while let Some(summary) = rx.blocking_recv() {
                for notifier in &notifiers {
                    if let Err(err) = notifier.notify(&summary) {
                        warn!(notifier = notifier.name(), error = %err, "notification failed");
                    }
                }
            }
        });
        (Self { tx }, task)
    }

    /// Queue `summary`; `false` when it was dropped
    pub fn publish(&self, summary: AlarmSummary) -> bool {
        match self.tx.try_send(summary) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("notification queue full, dropping result");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}
