//! Job runner.
//!
//! [`JobRunner::dispatch`] records a queued job, spawns it and returns a
//! [`JobHandle`] at once. Each stage runs in its own task under the
//! concurrency semaphore and the stage timeout, so a panic, a timeout or an
//! error ends only that job. Finished records stay queryable until taken or
//! swept.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument};

use shorts_media::ProgressSink;
use shorts_models::{JobFailure, JobId, JobOutcome, JobSnapshot, ProgressEvent, StageKind};

use crate::config::PipelineConfig;
use crate::error::{StageError, StageResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::{JobProgress, ProgressHub};

/// Runner limits.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub max_concurrent_jobs: usize,
    pub stage_timeout: Duration,
    pub job_retention: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for RunnerConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_concurrent_jobs: config.max_concurrent_jobs.max(1),
            stage_timeout: config.stage_timeout,
            job_retention: config.job_retention,
        }
    }
}

/// What a running stage gets from the runner.
pub struct JobContext {
    job_id: JobId,
    sink: JobSink,
    cancel: watch::Receiver<bool>,
    logger: JobLogger,
}

impl JobContext {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Progress sink bound to this job.
    pub fn progress(&self) -> &dyn ProgressSink {
        &self.sink
    }

    /// Flips to `true` when the runner shuts down.
    pub fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.cancel.clone()
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }
}

/// Updates the job record and forwards to the hub.
#[derive(Clone)]
struct JobSink {
    job_id: JobId,
    stage: StageKind,
    record: Arc<watch::Sender<JobSnapshot>>,
    hub: Arc<ProgressHub>,
}

impl ProgressSink for JobSink {
    fn emit(&self, event: ProgressEvent) {
        self.record.send_modify(|s| s.progress = event.clone());
        self.hub.publish(JobProgress {
            job_id: self.job_id.clone(),
            stage: self.stage,
            event,
        });
    }
}

/// Observes one dispatched job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    stage: StageKind,
    rx: watch::Receiver<JobSnapshot>,
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.rx.borrow().clone()
    }

    /// Resolve with the terminal snapshot.
    pub async fn wait(&self) -> JobSnapshot {
        let mut rx = self.rx.clone();
        if let Ok(snapshot) = rx.wait_for(JobSnapshot::is_terminal).await {
            return snapshot.clone();
        }
        let last = rx.borrow().clone();
        last
    }
}

type JobTable = HashMap<JobId, Arc<watch::Sender<JobSnapshot>>>;

struct RunnerInner {
    config: RunnerConfig,
    jobs: Mutex<JobTable>,
    semaphore: Arc<Semaphore>,
    hub: Arc<ProgressHub>,
    shutdown: watch::Sender<bool>,
}

/// Dispatches stages as independent tasks and keeps their records.
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<RunnerInner>,
}

impl JobRunner {
    pub fn new(config: RunnerConfig, hub: Arc<ProgressHub>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(RunnerInner {
                config,
                jobs: Mutex::new(HashMap::new()),
                semaphore,
                hub,
                shutdown,
            }),
        }
    }

    pub fn hub(&self) -> &Arc<ProgressHub> {
        &self.inner.hub
    }

    /// Start `work` as a new job. Never waits for the stage itself.
    pub fn dispatch<F, Fut>(&self, stage: StageKind, work: F) -> JobHandle
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = StageResult<JobOutcome>> + Send + 'static,
    {
        let id = JobId::new();
        let (tx, rx) = watch::channel(JobSnapshot::queued(id.clone(), stage));
        let record = Arc::new(tx);
        self.inner.jobs().insert(id.clone(), Arc::clone(&record));
        metrics::record_dispatched(stage);
        debug!(job_id = %id, stage = %stage, "Job dispatched");

        let inner = Arc::clone(&self.inner);
        let job_id = id.clone();
        tokio::spawn(async move {
            inner.execute(job_id, stage, record, work).await;
        });

        JobHandle { id, stage, rx }
    }

    /// Current snapshot of a job, if it is still known.
    pub fn status(&self, id: &JobId) -> Option<JobSnapshot> {
        self.inner.jobs().get(id).map(|record| record.borrow().clone())
    }

    /// Observe a job and remove it if it has finished.
    ///
    /// A job that is still queued or running is returned but kept.
    pub fn take(&self, id: &JobId) -> Option<JobSnapshot> {
        let mut jobs = self.inner.jobs();
        let snapshot = jobs.get(id).map(|record| record.borrow().clone())?;
        if snapshot.is_terminal() {
            jobs.remove(id);
        }
        Some(snapshot)
    }

    /// Drop finished jobs older than the retention period.
    pub fn sweep_expired(&self) -> usize {
        let retention = self.inner.config.job_retention;
        let now = Utc::now();
        let mut jobs = self.inner.jobs();
        let before = jobs.len();
        jobs.retain(|_, record| {
            let snapshot = record.borrow();
            let expired = snapshot
                .finished_at
                .and_then(|finished| (now - finished).to_std().ok())
                .map(|age| age >= retention)
                .unwrap_or(false);
            !expired
        });
        before - jobs.len()
    }

    /// Number of jobs that have not finished yet.
    pub fn active_jobs(&self) -> usize {
        self.inner
            .jobs()
            .values()
            .filter(|record| !record.borrow().is_terminal())
            .count()
    }

    /// Sweep periodically until shutdown.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let runner = self.clone();
        let mut shutdown_rx = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let removed = runner.sweep_expired();
                        if removed > 0 {
                            debug!(removed, "Swept finished jobs");
                        }
                    }
                }
            }
        })
    }

    /// Signal running stages to stop and refuse jobs still waiting for a slot.
    pub fn shutdown(&self) {
        info!("Job runner shutting down");
        let _ = self.inner.shutdown.send(true);
        self.inner.semaphore.close();
    }
}

impl RunnerInner {
    fn jobs(&self) -> MutexGuard<'_, JobTable> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn execute<F, Fut>(
        self: Arc<Self>,
        job_id: JobId,
        stage: StageKind,
        record: Arc<watch::Sender<JobSnapshot>>,
        work: F,
    ) where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = StageResult<JobOutcome>> + Send + 'static,
    {
        let logger = JobLogger::new(&job_id, stage);
        let sink = JobSink {
            job_id: job_id.clone(),
            stage,
            record: Arc::clone(&record),
            hub: Arc::clone(&self.hub),
        };
        let started = Instant::now();

        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.finish(
                    &sink,
                    &logger,
                    started,
                    Err(StageError::internal("runner is shutting down")),
                );
                return;
            }
        };

        record.send_modify(JobSnapshot::mark_running);
        logger.log_start(stage.as_str());

        let ctx = JobContext {
            job_id,
            sink: sink.clone(),
            cancel: self.shutdown.subscribe(),
            logger: logger.clone(),
        };
        let timeout = self.config.stage_timeout;
        let span = logger.create_span();

        // Separate task: a panic surfaces as a JoinError here instead of unwinding the runner.
        let task = tokio::spawn(
            async move { tokio::time::timeout(timeout, work(ctx)).await }.instrument(span),
        );
        let result = match task.await {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => Err(StageError::Timeout {
                stage,
                secs: timeout.as_secs(),
            }),
            Err(e) if e.is_panic() => Err(StageError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(StageError::internal(e.to_string())),
        };
        drop(permit);

        self.finish(&sink, &logger, started, result);
    }

    fn finish(
        &self,
        sink: &JobSink,
        logger: &JobLogger,
        started: Instant,
        result: StageResult<JobOutcome>,
    ) {
        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(outcome) => {
                logger.log_completion(&format!("{:.1}s", elapsed));
                sink.record.send_modify(|s| s.mark_succeeded(outcome));
                metrics::record_succeeded(sink.stage, elapsed);
            }
            Err(e) => {
                let kind = e.failure_kind();
                logger.log_error(&format!("{} ({})", e, e.kind()));

                // Stages report their own failure; panics and timeouts cannot.
                let reported = sink.record.borrow().progress.is_failure();
                if !reported {
                    sink.emit(ProgressEvent::failed(e.to_string()));
                }
                let failure = JobFailure::new(kind, e.to_string());
                sink.record.send_modify(|s| s.mark_failed(failure));
                metrics::record_failed(sink.stage, kind, elapsed);
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
