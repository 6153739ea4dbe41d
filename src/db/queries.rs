use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::job::{JobStatus, StyleJob};

fn job_from_row(row: &PgRow) -> Result<StyleJob, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(StyleJob {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        style_id: row.try_get("style_id")?,
        style_name: row.try_get("style_name")?,
        input_image_url: row.try_get("input_image_url")?,
        input_image2_url: row.try_get("input_image2_url")?,
        prompt: row.try_get("prompt")?,
        status,
        result_image_url: row.try_get("result_image_url")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        estimated_completion: row.try_get("estimated_completion")?,
    })
}

/// Insert a pending job row
pub async fn insert_job(pool: &PgPool, job: &StyleJob) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO jobs (id, user_id, style_id, style_name, input_image_url, input_image2_url,
                          prompt, status, created_at, estimated_completion)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(job.id)
    .bind(&job.user_id)
    .bind(&job.style_id)
    .bind(&job.style_name)
    .bind(&job.input_image_url)
    .bind(&job.input_image2_url)
    .bind(&job.prompt)
    .bind(job.status.as_ref())
    .bind(job.created_at)
    .bind(job.estimated_completion)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<StyleJob>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, style_id, style_name, input_image_url, input_image2_url, prompt,
               status, result_image_url, error_message, created_at, completed_at,
               estimated_completion
        FROM jobs
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Oldest pending jobs, without claiming them
pub async fn get_pending_jobs(pool: &PgPool, limit: i64) -> Result<Vec<StyleJob>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, style_id, style_name, input_image_url, input_image2_url, prompt,
               status, result_image_url, error_message, created_at, completed_at,
               estimated_completion
        FROM jobs
        WHERE status = 'pending'
        ORDER BY created_at ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Atomically move up to `limit` of the oldest pending jobs to `processing`.
///
/// Rows locked by a concurrent claimer are skipped rather than waited on,
/// so overlapping passes never receive the same job.
pub async fn claim_pending_jobs(pool: &PgPool, limit: i64) -> Result<Vec<StyleJob>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'processing',
            claimed_at = NOW()
        WHERE id IN (
            SELECT id
            FROM jobs
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, user_id, style_id, style_name, input_image_url, input_image2_url, prompt,
                  status, result_image_url, error_message, created_at, completed_at,
                  estimated_completion
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    // RETURNING carries no ordering guarantee
    let mut jobs = rows.iter().map(job_from_row).collect::<Result<Vec<_>, _>>()?;
    jobs.sort_by_key(|j| j.created_at);
    Ok(jobs)
}

/// Compare-and-swap `pending -> processing`. Returns false if another
/// claimer got there first.
pub async fn mark_processing(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'processing',
            claimed_at = NOW()
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Mark a claimed job completed. Returns the number of rows updated (0 if
/// the job was not in `processing`).
pub async fn complete_job<'e, E>(
    executor: E,
    job_id: Uuid,
    result_image_url: &str,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'completed',
            result_image_url = $2,
            completed_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(job_id)
    .bind(result_image_url)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Mark a non-terminal job failed
pub async fn fail_job(pool: &PgPool, job_id: Uuid, error: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'failed',
            error_message = $2
        WHERE id = $1 AND status IN ('pending', 'processing')
        "#,
    )
    .bind(job_id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Fail jobs stuck in `processing` since before `claimed_before`. Rows
/// claimed before `claimed_at` existed fall back to `created_at`.
pub async fn fail_stale_jobs(
    pool: &PgPool,
    claimed_before: DateTime<Utc>,
    error: &str,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'failed',
            error_message = $2
        WHERE status = 'processing'
          AND COALESCE(claimed_at, created_at) < $1
        RETURNING id
        "#,
    )
    .bind(claimed_before)
    .bind(error)
    .fetch_all(pool)
    .await?;

    rows.iter().map(|row| row.try_get("id")).collect()
}
