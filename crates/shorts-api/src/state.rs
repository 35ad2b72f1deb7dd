//! Application state.

use std::sync::Arc;

use shorts_worker::{Pipeline, PipelineConfig, TriggerResult};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Create new application state with the production pipeline.
    pub async fn new(config: ApiConfig, pipeline_config: PipelineConfig) -> TriggerResult<Self> {
        let pipeline = Pipeline::new(pipeline_config).await?;
        Ok(Self::with_pipeline(config, Arc::new(pipeline)))
    }

    pub fn with_pipeline(config: ApiConfig, pipeline: Arc<Pipeline>) -> Self {
        Self { config, pipeline }
    }
}
