//! Row mapping for the `jobs` table.

use aigpic_core::job::{Job, JobStatus, PendingJob};
use aigpic_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `jobs` table.
///
/// `job_id` is stored as its hyphenated text form and `results` as a JSON
/// array of filenames.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: DbId,
    pub job_id: String,
    pub status: String,
    pub prompt: String,
    pub requested_count: i64,
    pub config_name: String,
    pub reference_image: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub results: String,
    pub error: Option<String>,
}

fn decode_err(e: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

impl TryFrom<JobRow> for Job {
    type Error = sqlx::Error;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            job_id: row.job_id.parse().map_err(decode_err)?,
            status: row.status.parse::<JobStatus>().map_err(decode_err)?,
            prompt: row.prompt,
            requested_count: u32::try_from(row.requested_count).map_err(decode_err)?,
            config_name: row.config_name,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            results: serde_json::from_str(&row.results).map_err(decode_err)?,
            error: row.error,
        })
    }
}

impl TryFrom<JobRow> for PendingJob {
    type Error = sqlx::Error;

    fn try_from(mut row: JobRow) -> Result<Self, Self::Error> {
        let reference_image = row.reference_image.take();
        Ok(PendingJob {
            job: Job::try_from(row)?,
            reference_image,
        })
    }
}
