//! Single-flight, rate-limited dispatch of inference cycles

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use watchpost_core::Frame;

/// One inference cycle over a frame
pub trait CycleRunner: Send + Sync + 'static {
    fn run(&self, frame: Frame) -> impl Future<Output = ()> + Send;
}

/// Outcome of [`InferenceDispatcher::try_infer`]
#[derive(Debug)]
pub enum Dispatch {
    /// A cycle was spawned; it holds the lock until it finishes
    Started(JoinHandle<()>),
    /// Another cycle is running; the frame was dropped
    Busy,
    /// Too soon after the last start; the frame was dropped
    Throttled,
}

impl Dispatch {
    pub fn is_started(&self) -> bool {
        matches!(self, Dispatch::Started(_))
    }
}

/// Starts at most one cycle at a time, and never two within `interval` of
/// each other measured from their starts.
///
/// The lock holds the last start time, so the throttle check and the
/// single-flight check are one acquisition. The guard moves into the
/// spawned task and is released when the task ends, panics included.
pub struct InferenceDispatcher<C> {
    runner: Arc<C>,
    last_start: Arc<Mutex<Option<Instant>>>,
    interval: Duration,
}

impl<C: CycleRunner> InferenceDispatcher<C> {
    pub fn new(runner: Arc<C>, interval: Duration) -> Self {
        Self {
            runner,
            last_start: Arc::new(Mutex::new(None)),
            interval,
        }
    }

    /// Non-blocking; must be called from within a tokio runtime
    pub fn try_infer(&self, frame: Frame) -> Dispatch {
        let Ok(mut guard) = self.last_start.clone().try_lock_owned() else {
            return Dispatch::Busy;
        };

        let now = Instant::now();
        if let Some(last) = *guard {
            if now.duration_since(last) < self.interval {
                return Dispatch::Throttled;
            }
        }
        *guard = Some(now);

        debug!(sequence = frame.sequence(), "dispatching inference cycle");
        let runner = Arc::clone(&self.runner);
        Dispatch::Started(tokio::spawn(async move {
            let _guard = guard;
            runner.run(frame).await;
        }))
    }

    /// Whether a cycle currently holds the lock
    pub fn is_busy(&self) -> bool {
        self.last_start.try_lock().is_err()
    }

    pub fn runner(&self) -> &Arc<C> {
        &self.runner
    }
}
