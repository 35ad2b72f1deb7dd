//! Progress fan-out.
//!
//! Stages report through a [`ProgressSink`](shorts_media::ProgressSink); the
//! runner tags each event with its job and publishes it here. Consumers
//! either register a callback observer or take a broadcast stream.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::warn;

use shorts_models::{JobId, ProgressEvent, StageKind};

/// Default capacity of the broadcast stream.
pub const DEFAULT_STREAM_CAPACITY: usize = 256;

/// A progress event tagged with the job that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: JobId,
    pub stage: StageKind,
    pub event: ProgressEvent,
}

/// Handle returned by [`ProgressHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Callback invoked from worker tasks for every event.
pub type ProgressObserver = Arc<dyn Fn(&JobProgress) + Send + Sync>;

pub struct ProgressHub {
    observers: RwLock<HashMap<ObserverId, ProgressObserver>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<JobProgress>,
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            sender,
        }
    }

    pub fn subscribe(&self, observer: ProgressObserver) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut observers) = self.observers.write() {
            observers.insert(id, observer);
        }
        id
    }

    /// Returns `false` if the observer was not registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers
            .write()
            .map(|mut observers| observers.remove(&id).is_some())
            .unwrap_or(false)
    }

    /// Stream of every event published from now on.
    ///
    /// Slow receivers lose the oldest events (`RecvError::Lagged`).
    pub fn stream(&self) -> broadcast::Receiver<JobProgress> {
        self.sender.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().map(|o| o.len()).unwrap_or(0)
    }

    /// Deliver `progress` to observers and stream receivers.
    ///
    /// Observers run on the caller's task, outside the registry lock. A
    /// panicking observer is logged and skipped.
    pub fn publish(&self, progress: JobProgress) {
        let observers: Vec<ProgressObserver> = self
            .observers
            .read()
            .map(|o| o.values().cloned().collect())
            .unwrap_or_default();

        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(&progress))).is_err() {
                warn!(job_id = %progress.job_id, "Progress observer panicked");
            }
        }

        // No receivers is fine.
        let _ = self.sender.send(progress);
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_CAPACITY)
    }
}
