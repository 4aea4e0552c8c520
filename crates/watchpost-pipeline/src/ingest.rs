//! Ingestion loop: frame source to buffer to dispatcher, with stall
//! detection and reconnect backoff

use crate::dispatcher::{CycleRunner, Dispatch, InferenceDispatcher};
use crate::error::SourceError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use watchpost_core::{Frame, FrameBuffer, PipelineConfig};

/// A stream of decoded frames.
///
/// Calls may block; the ingestor runs them on the blocking pool.
pub trait FrameSource: Send + 'static {
    /// Open or reopen the stream
    fn connect(&mut self) -> Result<(), SourceError>;

    /// The next frame, or `None` when none is ready yet. A
    /// [`SourceError::Decode`] skips one frame; any other error drops the
    /// connection.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

/// Reads images dropped into a spool directory, oldest name first, and
/// deletes each one once read
pub struct DirectoryFrameSource {
    dir: PathBuf,
    read: u64,
}

impl DirectoryFrameSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            read: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_file(&self) -> Result<Option<PathBuf>, SourceError> {
        let mut oldest: Option<PathBuf> = None;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
                .unwrap_or(false);
            if !is_image || !path.is_file() {
                continue;
            }
            if oldest.as_ref().map_or(true, |current| path.file_name() < current.file_name()) {
                oldest = Some(path);
            }
        }
        Ok(oldest)
    }
}

impl FrameSource for DirectoryFrameSource {
    fn connect(&mut self) -> Result<(), SourceError> {
        if self.dir.is_dir() {
            Ok(())
        } else {
            Err(SourceError::Unavailable(self.dir.clone()))
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.next_file()? else {
            return Ok(None);
        };
        let bytes = std::fs::read(&path)?;
        std::fs::remove_file(&path)?;
        self.read += 1;
        Ok(Some(Frame::decode(&bytes, self.read)?))
    }
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Keep one frame out of every `stride`
    pub stride: u32,
    pub stall_timeout: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    /// Wait between reads when no frame is ready
    pub poll: Duration,
}

impl IngestSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            stride: config.frame_stride.max(1),
            stall_timeout: config.stall_timeout(),
            reconnect_initial: config.reconnect_initial(),
            reconnect_max: config.reconnect_max(),
            poll: config.source_poll(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub frames_received: u64,
    pub frames_accepted: u64,
    pub decode_errors: u64,
    pub connection_errors: u64,
    pub stalls: u64,
    pub dispatched: u64,
}

enum StreamEnd {
    Shutdown,
    Lost,
}

/// Owns the frame source and feeds accepted frames to the buffer and the
/// dispatcher until shutdown
pub struct Ingestor<S, C> {
    source: Option<S>,
    buffer: Arc<FrameBuffer>,
    dispatcher: Arc<InferenceDispatcher<C>>,
    settings: IngestSettings,
    stats: IngestStats,
}

impl<S: FrameSource, C: CycleRunner> Ingestor<S, C> {
    pub fn new(
        source: S,
        buffer: Arc<FrameBuffer>,
        dispatcher: Arc<InferenceDispatcher<C>>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            source: Some(source),
            buffer,
            dispatcher,
            settings,
            stats: IngestStats::default(),
        }
    }

    /// Run until `shutdown` turns true or its sender is dropped
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> IngestStats {
        let mut backoff = self.settings.reconnect_initial;
        loop {
            if *shutdown.borrow() || self.source.is_none() {
                break;
            }

            match self.on_source(|source| source.connect()).await {
                Ok(()) => {
                    info!("frame source connected");
                    backoff = self.settings.reconnect_initial;
                    if let StreamEnd::Shutdown = self.stream(&mut shutdown).await {
                        break;
                    }
                }
                Err(err) => {
                    self.stats.connection_errors += 1;
                    warn!(error = %err, retry_in = ?backoff, "frame source connect failed");
                }
            }

            if pause(&mut shutdown, backoff).await {
                break;
            }
            backoff = (backoff * 2).min(self.settings.reconnect_max);
        }

        info!(
            received = self.stats.frames_received,
            accepted = self.stats.frames_accepted,
            stalls = self.stats.stalls,
            "ingestion stopped"
        );
        self.stats
    }

    async fn stream(&mut self, shutdown: &mut watch::Receiver<bool>) -> StreamEnd {
        let mut last_frame = Instant::now();
        loop {
            if *shutdown.borrow() {
                return StreamEnd::Shutdown;
            }

            match self.on_source(|source| source.next_frame()).await {
                Ok(Some(frame)) => {
                    last_frame = Instant::now();
                    self.accept(frame);
                    continue;
                }
                Ok(None) => {}
                Err(SourceError::Decode(err)) => {
                    self.stats.decode_errors += 1;
                    warn!(error = %err, "skipping undecodable frame");
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "frame read failed");
                    return StreamEnd::Lost;
                }
            }

            if last_frame.elapsed() >= self.settings.stall_timeout {
                self.stats.stalls += 1;
                error!(
                    timeout = ?self.settings.stall_timeout,
                    "stream health check failed: no frames received"
                );
                return StreamEnd::Lost;
            }
            if pause(shutdown, self.settings.poll).await {
                return StreamEnd::Shutdown;
            }
        }
    }

    fn accept(&mut self, frame: Frame) {
        self.stats.frames_received += 1;
        let received = self.stats.frames_received;
        if (received - 1) % u64::from(self.settings.stride) != 0 {
            return;
        }
        self.stats.frames_accepted += 1;

        self.buffer.write(frame.with_sequence(received));
        self.buffer.swap();
        let Some(latest) = self.buffer.read() else {
            return;
        };
        match self.dispatcher.try_infer(latest) {
            Dispatch::Started(_) => self.stats.dispatched += 1,
            Dispatch::Busy => debug!(sequence = received, "inference busy, frame dropped"),
            Dispatch::Throttled => {}
        }
    }

    /// Run a source call on the blocking pool. A panicking call loses the
    /// source, which ends ingestion.
    async fn on_source<T, F>(&mut self, op: F) -> Result<T, SourceError>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> Result<T, SourceError> + Send + 'static,
    {
        let Some(mut source) = self.source.take() else {
            return Err(SourceError::Task("frame source lost".to_string()));
        };
        let joined = tokio::task::spawn_blocking(move || {
            let result = op(&mut source);
            (source, result)
        })
        .await;
        match joined {
            Ok((source, result)) => {
                self.source = Some(source);
                result
            }
            Err(err) => {
                error!(error = %err, "frame source task failed");
                Err(SourceError::Task(err.to_string()))
            }
        }
    }
}

/// Sleep for `duration`; `true` when shutdown was requested meanwhile
async fn pause(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
