//! Debounced background re-indexing
//!
//! One long-lived task owns every rebuild. Requests go through a channel of
//! capacity one, so a burst of new cases collapses into a single pending
//! request and rebuilds never overlap.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use watchpost_index::{build_index, BuildOptions, BuildReport, IndexError, Retriever};

/// Blocking full rebuild of the index
pub type RebuildFn = Arc<dyn Fn() -> Result<BuildReport, IndexError> + Send + Sync>;

/// Rebuild `index_path` from `source_dir` with the retriever's embedder
pub fn index_rebuilder(
    source_dir: PathBuf,
    index_path: PathBuf,
    retriever: Arc<Retriever>,
    options: BuildOptions,
) -> RebuildFn {
    Arc::new(move || {
        let embedder = retriever.embedder()?;
        build_index(&source_dir, &index_path, embedder.as_ref(), options)
    })
}

/// Cheap handle for requesting a rebuild
#[derive(Clone)]
pub struct ReindexHandle {
    tx: mpsc::Sender<()>,
}

impl ReindexHandle {
    /// Returns `false` only when the scheduler has stopped. A request made
    /// while one is already pending is merged into it.
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("reindex already pending");
                true
            }
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

pub struct ReindexScheduler {
    handle: ReindexHandle,
    task: JoinHandle<()>,
}

impl ReindexScheduler {
    /// Start the scheduler task on the current runtime
    pub fn spawn(
        rebuild: RebuildFn,
        retriever: Arc<Retriever>,
        debounce: Duration,
        grace: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(run(rx, rebuild, retriever, debounce, grace, shutdown));
        Self {
            handle: ReindexHandle { tx },
            task,
        }
    }

    pub fn handle(&self) -> ReindexHandle {
        self.handle.clone()
    }

    /// Wait for the task to exit after shutdown has been signalled
    pub async fn join(self) {
        drop(self.handle);
        let _ = self.task.await;
    }
}

async fn run(
    mut rx: mpsc::Receiver<()>,
    rebuild: RebuildFn,
    retriever: Arc<Retriever>,
    debounce: Duration,
    grace: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            request = rx.recv() => {
                if request.is_none() {
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }

        // Wait out the burst: restart the quiet period while requests keep
        // arriving.
        loop {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => {}
                _ = shutdown.changed() => {
                    info!("shutdown during reindex debounce, rebuild skipped");
                    return;
                }
            }
            if rx.try_recv().is_err() {
                break;
            }
        }

        let job = Arc::clone(&rebuild);
        match tokio::task::spawn_blocking(move || job()).await {
            Ok(Ok(report)) => {
                info!(chunks = report.chunks, documents = report.documents, "reindex finished");
                // Shutdown cuts the grace period short; the new index is
                // still made visible.
                let stopping = tokio::select! {
                    _ = tokio::time::sleep(grace) => false,
                    _ = shutdown.changed() => true,
                };
                retriever.refresh();
                if stopping {
                    break;
                }
            }
            Ok(Err(err)) => {
                error!(error = %err, "reindex failed, keeping the previous index");
            }
            Err(err) => {
                error!(error = %err, "reindex task panicked, keeping the previous index");
            }
        }

        if *shutdown.borrow() {
            break;
        }
    }
    debug!("reindex scheduler stopped");
}
