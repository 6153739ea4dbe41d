use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::models::api::{JobOutcome, OutcomeStatus};
use crate::models::job::StyleJob;
use crate::services::{
    job_store::{JobStore, StoreError},
    ledger::LedgerError,
    pipeline::{ProcessError, PromptMode, StylePipeline},
};

/// Tunables for the queue processor.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Maximum jobs claimed per pass.
    pub batch_size: usize,
    /// Pause between consecutive jobs of one pass (upstream rate limit).
    pub inter_job_delay: Duration,
    /// Period of the scheduler's timer.
    pub poll_interval: Duration,
    /// A job still `processing` this long after its claim is failed as
    /// abandoned. Must exceed the worst-case duration of one job.
    pub stale_after: Duration,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            inter_job_delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(15 * 60),
        }
    }
}

/// Drains pending jobs through the styling pipeline.
///
/// Timer ticks and on-demand wake-ups both call [`JobProcessor::run_once`];
/// passes within one process are serialised, and the store's atomic claim
/// keeps separate processes from sharing a job.
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    pipeline: Arc<StylePipeline>,
    settings: ProcessorSettings,
    pass_lock: Mutex<()>,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        pipeline: Arc<StylePipeline>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            store,
            pipeline,
            settings,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    /// Fail abandoned jobs, then claim one batch and attempt every job in
    /// it, oldest first.
    ///
    /// Only an unreachable store is an error; per-job failures are recorded on the
    /// job and reported in the returned outcomes.
    pub async fn run_once(&self) -> Result<Vec<JobOutcome>, StoreError> {
        let _pass = self.pass_lock.lock().await;

        self.fail_abandoned().await?;

        let jobs = self.store.claim_batch(self.settings.batch_size).await?;
        metrics::gauge!("style_jobs_claimed_last_pass").set(jobs.len() as f64);

        if jobs.is_empty() {
            tracing::debug!("No pending jobs");
            return Ok(Vec::new());
        }

        tracing::info!(count = jobs.len(), "Claimed pending jobs");

        let mut outcomes = Vec::with_capacity(jobs.len());
        for (index, job) in jobs.iter().enumerate() {
            if index > 0 && !self.settings.inter_job_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_job_delay).await;
            }
            outcomes.push(self.run_job(job).await);
        }

        Ok(outcomes)
    }

    /// Fail jobs whose claimer stopped before settling them.
    async fn fail_abandoned(&self) -> Result<(), StoreError> {
        let stale_after = self.settings.stale_after;
        let Some(cutoff) = chrono::Duration::from_std(stale_after)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(());
        };
        let message = format!(
            "abandoned: still processing {}s after claim",
            stale_after.as_secs()
        );

        let abandoned = self.store.fail_stale(cutoff, &message).await?;
        if !abandoned.is_empty() {
            metrics::counter!("style_jobs_abandoned").increment(abandoned.len() as u64);
            for job_id in &abandoned {
                tracing::warn!(job_id = %job_id, "Abandoned job marked failed");
            }
        }
        Ok(())
    }

    async fn run_job(&self, job: &StyleJob) -> JobOutcome {
        tracing::info!(
            job_id = %job.id,
            user_id = %job.user_id,
            style = %job.style_name,
            "Processing job"
        );
        let start = std::time::Instant::now();

        match self.process_job(job).await {
            Ok(remaining) => {
                metrics::counter!("style_jobs_completed").increment(1);
                tracing::info!(
                    job_id = %job.id,
                    user_id = %job.user_id,
                    remaining_credits = remaining,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job completed"
                );
                JobOutcome {
                    id: job.id,
                    status: OutcomeStatus::Success,
                    error: None,
                }
            }
            Err(e) => {
                metrics::counter!("style_jobs_failed").increment(1);
                let message = e.to_string();
                tracing::error!(job_id = %job.id, user_id = %job.user_id, error = %message, "Job failed");

                if let Err(store_err) = self.store.mark_failed(job.id, &message).await {
                    tracing::error!(job_id = %job.id, error = %store_err, "Failed to record job failure");
                }

                JobOutcome {
                    id: job.id,
                    status: OutcomeStatus::Failed,
                    error: Some(message),
                }
            }
        }
    }

    /// Credit check, fetch, generate, publish, then settle. Returns the
    /// user's remaining balance.
    async fn process_job(&self, job: &StyleJob) -> Result<i32, ProcessError> {
        if let Err(e) = self.pipeline.ensure_credit(&job.user_id).await {
            return Err(match e {
                ProcessError::Ledger(LedgerError::ProfileNotFound(_)) => {
                    ProcessError::InsufficientCredit { balance: 0 }
                }
                other => other,
            });
        }

        let images = self.pipeline.fetch_inputs(job.input_urls()).await?;
        tracing::debug!(job_id = %job.id, images = images.len(), "Inputs downloaded");

        let generated = self
            .pipeline
            .render(&job.prompt, PromptMode::Literal, &images)
            .await?;

        let url = self
            .pipeline
            .publisher()
            .publish(job.id, &job.user_id, &generated.bytes)
            .await?;
        tracing::debug!(job_id = %job.id, url = %url, "Result published");

        match self.store.mark_completed(job.id, &job.user_id, &url).await {
            Ok(remaining) => Ok(remaining),
            // Balance drained by a concurrent job since the check above
            Err(StoreError::InsufficientCredit(_)) => {
                Err(ProcessError::InsufficientCredit { balance: 0 })
            }
            Err(e) => Err(e.into()),
        }
    }
}
