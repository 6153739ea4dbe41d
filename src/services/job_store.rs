use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::db::{ledger as ledger_queries, queries};
use crate::models::job::{JobStatus, NewJob, StyleJob};

/// Durable queue of styling jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job.
    async fn enqueue(&self, job: NewJob) -> Result<StyleJob, StoreError>;

    async fn get(&self, job_id: Uuid) -> Result<Option<StyleJob>, StoreError>;

    /// Oldest pending jobs first, without changing their status.
    async fn pending_jobs(&self, limit: usize) -> Result<Vec<StyleJob>, StoreError>;

    /// Compare-and-swap `pending -> processing`. Returns whether this caller
    /// won the job.
    async fn mark_processing(&self, job_id: Uuid) -> Result<bool, StoreError>;

    /// Claim up to `limit` of the oldest pending jobs for exclusive
    /// processing. Returned jobs are already in `processing`, oldest first.
    async fn claim_batch(&self, limit: usize) -> Result<Vec<StyleJob>, StoreError> {
        let mut claimed = Vec::new();
        for mut job in self.pending_jobs(limit).await? {
            if self.mark_processing(job.id).await? {
                job.status = JobStatus::Processing;
                claimed.push(job);
            }
        }
        Ok(claimed)
    }

    /// Deduct one credit from `user_id` and mark the job completed, as a
    /// single unit. Returns the remaining balance.
    async fn mark_completed(
        &self,
        job_id: Uuid,
        user_id: &str,
        result_image_url: &str,
    ) -> Result<i32, StoreError>;

    async fn mark_failed(&self, job_id: Uuid, error_message: &str) -> Result<(), StoreError>;

    /// Fail every job still `processing` that was claimed before `claimed_before`.
    /// Returns the ids that were failed.
    async fn fail_stale(
        &self,
        claimed_before: DateTime<Utc>,
        error_message: &str,
    ) -> Result<Vec<Uuid>, StoreError>;

    /// Connectivity check for health reporting.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job store unavailable: {0}")]
    Unavailable(String),

    #[error("job {0} is not in processing state")]
    NotClaimed(Uuid),

    #[error("insufficient credit for user {0}")]
    InsufficientCredit(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Postgres-backed job store.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[instrument(skip(self, job), fields(user_id = %job.user_id, style_id = %job.style_id))]
    async fn enqueue(&self, job: NewJob) -> Result<StyleJob, StoreError> {
        let job = job.into_pending(Uuid::new_v4(), Utc::now());
        queries::insert_job(&self.pool, &job).await?;
        tracing::info!(job_id = %job.id, "Job enqueued");
        Ok(job)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<StyleJob>, StoreError> {
        Ok(queries::get_job(&self.pool, job_id).await?)
    }

    async fn pending_jobs(&self, limit: usize) -> Result<Vec<StyleJob>, StoreError> {
        Ok(queries::get_pending_jobs(&self.pool, limit as i64).await?)
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<bool, StoreError> {
        Ok(queries::mark_processing(&self.pool, job_id).await?)
    }

    async fn claim_batch(&self, limit: usize) -> Result<Vec<StyleJob>, StoreError> {
        Ok(queries::claim_pending_jobs(&self.pool, limit as i64).await?)
    }

    #[instrument(skip(self, result_image_url))]
    async fn mark_completed(
        &self,
        job_id: Uuid,
        user_id: &str,
        result_image_url: &str,
    ) -> Result<i32, StoreError> {
        let mut tx = self.pool.begin().await?;

        let Some(remaining) = ledger_queries::decrement_credit(&mut *tx, user_id).await? else {
            tx.rollback().await?;
            return Err(StoreError::InsufficientCredit(user_id.to_string()));
        };

        if queries::complete_job(&mut *tx, job_id, result_image_url).await? == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotClaimed(job_id));
        }

        tx.commit().await?;
        Ok(remaining)
    }

    async fn mark_failed(&self, job_id: Uuid, error_message: &str) -> Result<(), StoreError> {
        let updated = queries::fail_job(&self.pool, job_id, error_message).await?;
        if updated == 0 {
            tracing::warn!(job_id = %job_id, "Job already terminal, failure not recorded");
        }
        Ok(())
    }

    async fn fail_stale(
        &self,
        claimed_before: DateTime<Utc>,
        error_message: &str,
    ) -> Result<Vec<Uuid>, StoreError> {
        Ok(queries::fail_stale_jobs(&self.pool, claimed_before, error_message).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
