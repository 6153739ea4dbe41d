use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::config::AppConfig;
use crate::services::{
    fetcher::MediaFetcher,
    generation::GeminiClient,
    job_store::{JobStore, PgJobStore},
    ledger::PgCreditLedger,
    pipeline::StylePipeline,
    processor::JobProcessor,
    storage::{R2Client, ResultPublisher},
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub pipeline: Arc<StylePipeline>,
    pub processor: Arc<JobProcessor>,
    /// Wakes the scheduler after an enqueue. Notifications are dropped
    /// silently when no scheduler runs in this process.
    pub wake: Arc<Notify>,
}

impl AppState {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        pipeline: Arc<StylePipeline>,
        processor: Arc<JobProcessor>,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            jobs,
            pipeline,
            processor,
            wake,
        }
    }
}

/// Production wiring shared by the API server and the worker binary.
pub struct Components {
    pub jobs: Arc<dyn JobStore>,
    pub pipeline: Arc<StylePipeline>,
    pub processor: Arc<JobProcessor>,
}

impl Components {
    pub fn from_config(
        config: &AppConfig,
        pool: PgPool,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
        let ledger = Arc::new(PgCreditLedger::new(pool));

        let generator = GeminiClient::new(
            &config.gemini_base_url,
            &config.gemini_model,
            &config.gemini_api_key,
            config.generation_timeout(),
        )?;

        let storage = R2Client::new(
            &config.r2_bucket,
            &config.r2_endpoint,
            &config.r2_access_key,
            &config.r2_secret_key,
            &config.r2_public_url,
        )?;

        let fetcher =
            MediaFetcher::new(config.http_timeout())?.with_max_bytes(config.max_input_bytes);

        let pipeline = Arc::new(StylePipeline::new(
            ledger,
            Arc::new(generator),
            fetcher,
            ResultPublisher::new(Arc::new(storage)),
        ));

        let processor = Arc::new(JobProcessor::new(
            Arc::clone(&jobs),
            Arc::clone(&pipeline),
            config.processor_settings(),
        ));

        Ok(Self {
            jobs,
            pipeline,
            processor,
        })
    }
}
