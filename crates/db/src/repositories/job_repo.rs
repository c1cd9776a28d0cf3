//! Repository for the `jobs` table.
//!
//! Every transition write is a single guarded statement (or one transaction)
//! whose `WHERE status ...` clause re-checks the source state, so a write
//! that lost a race reports `false` instead of clobbering a newer state.

use aigpic_core::job::{Job, JobStatus, PendingJob};
use aigpic_core::types::{JobId, Timestamp};
use sqlx::SqlitePool;

use crate::models::job::JobRow;
use crate::repositories::ImageRepo;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, job_id, status, prompt, requested_count, config_name, reference_image, \
    created_at, started_at, finished_at, results, error";

/// Maximum page size for job listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
pub const DEFAULT_LIMIT: i64 = 20;

/// Provides persistence for generation jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a freshly submitted `queued` job.
    pub async fn create(
        pool: &SqlitePool,
        job: &Job,
        reference_image: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO jobs \
                (job_id, status, prompt, requested_count, config_name, reference_image, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.job_id.to_string())
        .bind(JobStatus::Queued.as_str())
        .bind(&job.prompt)
        .bind(i64::from(job.requested_count))
        .bind(&job.config_name)
        .bind(reference_image)
        .bind(job.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Persist `queued -> running`. Returns `false` if the job was not queued.
    pub async fn mark_running(pool: &SqlitePool, job: &Job) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, started_at = ? \
             WHERE job_id = ? AND status = ?",
        )
        .bind(JobStatus::Running.as_str())
        .bind(job.started_at)
        .bind(job.job_id.to_string())
        .bind(JobStatus::Queued.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Persist `running -> succeeded` together with one gallery row per result.
    ///
    /// Runs in a single transaction; nothing is written unless the job was
    /// still `running`.
    pub async fn complete(pool: &SqlitePool, job: &Job) -> Result<bool, sqlx::Error> {
        let finished_at = job.finished_at.unwrap_or_else(chrono::Utc::now);
        let results = serde_json::to_string(&job.results)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let mut tx = pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE jobs \
             SET status = ?, finished_at = ?, results = ?, error = NULL, reference_image = NULL \
             WHERE job_id = ? AND status = ?",
        )
        .bind(JobStatus::Succeeded.as_str())
        .bind(finished_at)
        .bind(results)
        .bind(job.job_id.to_string())
        .bind(JobStatus::Running.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        for filename in &job.results {
            ImageRepo::insert(&mut *tx, filename, &job.prompt, finished_at).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Persist a transition to `failed` from `queued` or `running`.
    ///
    /// `started_at` is written as well, so a job failed before its running
    /// write landed still satisfies the timestamp invariants.
    pub async fn fail(pool: &SqlitePool, job: &Job) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = ?, started_at = COALESCE(started_at, ?), finished_at = ?, \
                 error = ?, results = '[]', reference_image = NULL \
             WHERE job_id = ? AND status IN (?, ?)",
        )
        .bind(JobStatus::Failed.as_str())
        .bind(job.started_at.or(job.finished_at))
        .bind(job.finished_at)
        .bind(job.error.as_deref())
        .bind(job.job_id.to_string())
        .bind(JobStatus::Queued.as_str())
        .bind(JobStatus::Running.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark every `running` job as `failed` with `reason`.
    ///
    /// Used at startup: a job still `running` was interrupted by the previous
    /// process and cannot be resumed. Returns the number of jobs updated.
    pub async fn fail_interrupted(
        pool: &SqlitePool,
        reason: &str,
        at: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = ?, started_at = COALESCE(started_at, ?), finished_at = ?, \
                 error = ?, results = '[]', reference_image = NULL \
             WHERE status = ?",
        )
        .bind(JobStatus::Failed.as_str())
        .bind(at)
        .bind(at)
        .bind(reason)
        .bind(JobStatus::Running.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Find a job by its public id.
    pub async fn find_by_id(pool: &SqlitePool, job_id: JobId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE job_id = ?");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id.to_string())
            .fetch_optional(pool)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    /// The `limit` most recently submitted jobs, newest first.
    ///
    /// `limit` is clamped to `1..=MAX_LIMIT`.
    pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        let limit = limit.clamp(1, MAX_LIMIT);
        let query = format!("SELECT {COLUMNS} FROM jobs ORDER BY id DESC LIMIT ?");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(Job::try_from)
            .collect()
    }

    /// All `queued` jobs in admission order, with their reference images.
    pub async fn list_queued(pool: &SqlitePool) -> Result<Vec<PendingJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE status = ? ORDER BY created_at ASC, job_id ASC"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(JobStatus::Queued.as_str())
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(PendingJob::try_from)
            .collect()
    }
}
