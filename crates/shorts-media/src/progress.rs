//! Progress reporting for pipeline stages.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use shorts_models::ProgressEvent;

/// Receiver of progress events emitted by a stage.
///
/// Implementations are invoked from the stage's own task and must not block.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.events().iter().map(|e| e.percent).collect()
    }

    pub fn last(&self) -> Option<ProgressEvent> {
        self.events().last().cloned()
    }
}

impl ProgressSink for RecordingProgress {
    fn emit(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Per-invocation reporter that keeps the percent non-decreasing.
///
/// A report below the last emitted percent is raised to it. The only way
/// back to zero is [`StageProgress::fail`].
pub struct StageProgress<'a> {
    sink: &'a dyn ProgressSink,
    last: AtomicU8,
}

impl<'a> StageProgress<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last: AtomicU8::new(0),
        }
    }

    /// Emit `percent` (clamped to the last value and to 100).
    pub fn report(&self, percent: u8, message: impl Into<String>) {
        let percent = percent.min(100);
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        self.sink
            .emit(ProgressEvent::new(percent.max(previous), message));
    }

    /// Emit an intermediate percent only if it moves forward.
    pub fn advance(&self, percent: u8, message: impl Into<String>) {
        if percent > self.current() {
            self.report(percent, message);
        }
    }

    pub fn complete(&self, message: impl Into<String>) {
        self.report(100, message);
    }

    /// Emit the terminal failure event (0%, "Error: ...").
    pub fn fail(&self, cause: impl AsRef<str>) {
        self.last.store(0, Ordering::SeqCst);
        self.sink.emit(ProgressEvent::failed(cause));
    }

    pub fn current(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }
}
