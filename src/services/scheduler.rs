use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::models::api::OutcomeStatus;
use crate::services::processor::JobProcessor;

/// Floor for the timer period; `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Fires processor passes on a fixed interval and on demand.
///
/// Runs until the cancellation token is triggered; a pass in flight is
/// allowed to finish first.
pub struct JobScheduler {
    processor: Arc<JobProcessor>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
}

impl JobScheduler {
    pub fn new(processor: Arc<JobProcessor>, cancel: CancellationToken) -> Self {
        Self {
            processor,
            wake: Arc::new(Notify::new()),
            cancel,
        }
    }

    /// Handle for requesting an immediate pass. Never blocks; wake-ups that
    /// arrive during a pass coalesce into one follow-up pass.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut period = self.processor.settings().poll_interval;
        if period.is_zero() {
            tracing::warn!(
                "Poll interval of zero requested, using {}s",
                MIN_POLL_INTERVAL.as_secs()
            );
            period = MIN_POLL_INTERVAL;
        }
        tracing::info!(interval_secs = period.as_secs(), "Job scheduler started");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Job scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    tracing::debug!("Scheduler tick");
                }
                _ = self.wake.notified() => {
                    tracing::debug!("Scheduler woken on demand");
                }
            }

            match self.processor.run_once().await {
                Ok(outcomes) if !outcomes.is_empty() => {
                    let failed = outcomes
                        .iter()
                        .filter(|o| o.status == OutcomeStatus::Failed)
                        .count();
                    tracing::info!(processed = outcomes.len(), failed, "Processor pass finished");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Could not claim jobs, will retry next tick");
                }
            }
        }
    }
}
