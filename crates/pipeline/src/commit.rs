//! Serialized transition writes with event publication.
//!
//! Every store write and its event happen under one short commit lock, so
//! store order and event order agree. Failed writes are retried with
//! bounded backoff; the lock is released while backing off.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use aigpic_core::job::{Job, JobStatus, PendingJob};
use aigpic_core::submission::ValidatedSubmission;
use aigpic_core::types::JobId;
use aigpic_db::repositories::JobRepo;
use aigpic_db::DbPool;
use aigpic_events::{EventBus, JobEvent};
use chrono::Utc;

use crate::retry::{next_delay, RetryPolicy};

/// The store write to perform for a job already transitioned in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Running,
    Succeeded,
    Failed,
}

pub(crate) struct Committer {
    pool: DbPool,
    bus: Arc<EventBus>,
    policy: RetryPolicy,
    lock: tokio::sync::Mutex<()>,
    /// Non-terminal jobs known to this process, by last committed status.
    active: Mutex<HashMap<JobId, JobStatus>>,
}

impl Committer {
    pub fn new(pool: DbPool, bus: Arc<EventBus>, policy: RetryPolicy) -> Self {
        Self {
            pool,
            bus,
            policy,
            lock: tokio::sync::Mutex::new(()),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Persist a new `queued` job, hand it to `enqueue` and publish its
    /// creation event, all under the commit lock.
    ///
    /// The id and `created_at` are allocated inside the lock so their order
    /// matches store order. Not retried: the caller sees the error.
    pub async fn create(
        &self,
        submission: ValidatedSubmission,
        enqueue: impl FnOnce(PendingJob),
    ) -> Result<Job, sqlx::Error> {
        let _guard = self.lock.lock().await;

        let job = Job::new_queued(
            uuid::Uuid::now_v7(),
            submission.prompt,
            submission.requested_count,
            submission.config_name,
            Utc::now(),
        );
        JobRepo::create(&self.pool, &job, submission.reference_image.as_deref()).await?;

        self.track(&job);
        self.bus.publish(JobEvent::new(job.clone()));
        enqueue(PendingJob {
            job: job.clone(),
            reference_image: submission.reference_image,
        });
        Ok(job)
    }

    /// Persist `transition` for `job` and publish it if the write applied.
    ///
    /// Returns `Ok(false)` when the guarded write found the job in an
    /// unexpected state. Errors are returned after the retry budget is spent.
    pub async fn commit(&self, job: &Job, transition: Transition) -> Result<bool, sqlx::Error> {
        let mut delay = self.policy.initial_delay;
        let mut attempt = 1;

        loop {
            let result = {
                let _guard = self.lock.lock().await;
                let result = self.write(job, transition).await;
                match &result {
                    Ok(true) => {
                        self.track(job);
                        self.bus.publish(JobEvent::new(job.clone()));
                    }
                    Ok(false) => self.forget(job.job_id),
                    Err(_) => {}
                }
                result
            };

            match result {
                Err(e) if attempt < self.policy.max_attempts => {
                    tracing::warn!(
                        job_id = %job.job_id,
                        ?transition,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Job write failed, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, &self.policy);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Record a job recovered from the store at startup.
    pub fn track_recovered(&self, job: &Job) {
        self.track(job);
    }

    /// Drop a job from the active index without a store write.
    pub fn forget(&self, job_id: JobId) {
        self.active().remove(&job_id);
    }

    /// `(queued, running)` counts of the active index.
    pub fn counts(&self) -> (usize, usize) {
        let active = self.active();
        let running = active
            .values()
            .filter(|s| **s == JobStatus::Running)
            .count();
        (active.len() - running, running)
    }

    pub fn running_ids(&self) -> Vec<JobId> {
        self.active()
            .iter()
            .filter(|(_, s)| **s == JobStatus::Running)
            .map(|(id, _)| *id)
            .collect()
    }

    // ---- private helpers ----

    async fn write(&self, job: &Job, transition: Transition) -> Result<bool, sqlx::Error> {
        match transition {
            Transition::Running => JobRepo::mark_running(&self.pool, job).await,
            Transition::Succeeded => JobRepo::complete(&self.pool, job).await,
            Transition::Failed => JobRepo::fail(&self.pool, job).await,
        }
    }

    fn track(&self, job: &Job) {
        let mut active = self.active();
        if job.status.is_terminal() {
            active.remove(&job.job_id);
        } else {
            active.insert(job.job_id, job.status);
        }
    }

    fn active(&self) -> MutexGuard<'_, HashMap<JobId, JobStatus>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
