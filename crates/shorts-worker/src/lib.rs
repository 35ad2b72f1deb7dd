//! Job runner and pipeline context.
//!
//! This crate provides:
//! - The job runner: bounded, panic-isolated, timed stage tasks with
//!   pollable records
//! - Progress fan-out to callback observers and broadcast streams
//! - The pipeline trigger interface over fetch, transform, authenticate and
//!   publish

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use error::{StageError, StageResult, TriggerError, TriggerResult};
pub use logging::JobLogger;
pub use pipeline::Pipeline;
pub use progress::{JobProgress, ObserverId, ProgressHub, ProgressObserver};
pub use runner::{JobContext, JobHandle, JobRunner, RunnerConfig};
