//! The task orchestrator: submission, queries, subscriptions and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use aigpic_core::error::CoreError;
use aigpic_core::job::Job;
use aigpic_core::submission::{validate_submission, NewJobRequest};
use aigpic_core::types::JobId;
use aigpic_db::repositories::JobRepo;
use aigpic_db::DbPool;
use aigpic_events::{EventBus, JobSubscription};
use aigpic_provider::GenerationClient;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::commit::Committer;
use crate::error::PipelineError;
use crate::output::OutputStore;
use crate::queue::ReadyQueue;
use crate::retry::RetryPolicy;
use crate::worker;

/// Error recorded on jobs found `running` at startup.
pub const INTERRUPTED_ERROR: &str = "Interrupted: the service restarted while this job was running";

/// Default snapshot size for [`Orchestrator::subscribe`].
pub const DEFAULT_SNAPSHOT_LIMIT: i64 = 15;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Number of workers, i.e. the most jobs running at once.
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            retry: RetryPolicy::default(),
        }
    }
}

/// Live counters for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub max_concurrent: usize,
}

/// A snapshot of recent jobs plus the stream of changes after it.
pub struct JobFeed {
    /// Most recent jobs, newest first.
    pub snapshot: Vec<Job>,
    pub updates: JobSubscription,
}

/// State shared between the orchestrator handle and its workers.
pub(crate) struct Shared {
    pub(crate) client: Arc<dyn GenerationClient>,
    pub(crate) queue: ReadyQueue,
    pub(crate) committer: Committer,
    pub(crate) output: OutputStore,
}

/// Bounded-concurrency job orchestrator.
///
/// Created once at startup via [`Orchestrator::start`] and shared behind an
/// `Arc`. Holds no process-wide state; the store is the durable truth.
pub struct Orchestrator {
    pool: DbPool,
    bus: Arc<EventBus>,
    shared: Arc<Shared>,
    max_concurrent: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Recover persisted state and start the worker pool.
    ///
    /// Jobs left `running` by a previous process are marked failed with
    /// [`INTERRUPTED_ERROR`]; jobs left `queued` are requeued in order.
    pub async fn start(
        pool: DbPool,
        client: Arc<dyn GenerationClient>,
        bus: Arc<EventBus>,
        output: OutputStore,
        config: OrchestratorConfig,
    ) -> Result<Self, PipelineError> {
        let max_concurrent = config.max_concurrent.max(1);
        let shared = Arc::new(Shared {
            client,
            queue: ReadyQueue::new(),
            committer: Committer::new(pool.clone(), Arc::clone(&bus), config.retry),
            output,
        });

        let interrupted = JobRepo::fail_interrupted(&pool, INTERRUPTED_ERROR, Utc::now()).await?;
        if interrupted > 0 {
            tracing::warn!(count = interrupted, "Marked interrupted jobs as failed");
        }

        let requeued = JobRepo::list_queued(&pool).await?;
        if !requeued.is_empty() {
            tracing::info!(count = requeued.len(), "Requeued jobs from previous run");
        }
        for pending in requeued {
            shared.committer.track_recovered(&pending.job);
            shared.queue.push(pending);
        }

        let cancel = CancellationToken::new();
        let workers = (0..max_concurrent)
            .map(|worker_id| {
                tokio::spawn(worker::run(worker_id, Arc::clone(&shared), cancel.clone()))
            })
            .collect();

        tracing::info!(max_concurrent, "Orchestrator started");

        Ok(Self {
            pool,
            bus,
            shared,
            max_concurrent,
            workers: Mutex::new(workers),
            cancel,
        })
    }

    /// Validate and admit a new job. Returns once it is persisted as `queued`.
    pub async fn submit(&self, request: NewJobRequest) -> Result<JobId, PipelineError> {
        let client = &self.shared.client;
        let submission = validate_submission(request, |name| client.has_config(name))?;

        let job = self
            .shared
            .committer
            .create(submission, |pending| self.shared.queue.push(pending))
            .await?;

        tracing::info!(
            job_id = %job.job_id,
            config_name = %job.config_name,
            requested = job.requested_count,
            "Job submitted",
        );
        Ok(job.job_id)
    }

    pub async fn get(&self, job_id: JobId) -> Result<Job, PipelineError> {
        JobRepo::find_by_id(&self.pool, job_id)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound {
                    entity: "job",
                    id: job_id.to_string(),
                }
                .into()
            })
    }

    /// The `limit` most recent jobs, newest first. `limit` is clamped to 1..=100.
    pub async fn list(&self, limit: i64) -> Result<Vec<Job>, PipelineError> {
        Ok(JobRepo::list_recent(&self.pool, limit).await?)
    }

    /// Subscribe to job changes, with a snapshot of the `limit` latest jobs.
    ///
    /// The subscription is registered before the snapshot is read, so any
    /// change not reflected in the snapshot arrives on `updates`.
    pub async fn subscribe(&self, limit: i64) -> Result<JobFeed, PipelineError> {
        let updates = self.bus.subscribe();
        let snapshot = JobRepo::list_recent(&self.pool, limit).await?;
        Ok(JobFeed { snapshot, updates })
    }

    pub fn stats(&self) -> QueueStats {
        let (queued, running) = self.shared.committer.counts();
        QueueStats {
            queued,
            running,
            max_concurrent: self.max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Stop claiming new jobs and wait up to `grace` for running ones.
    ///
    /// Workers still busy after `grace` are aborted; their jobs stay
    /// `running` in the store and are surfaced on the next start. Queued
    /// jobs stay queued and are picked up on the next start.
    pub async fn shutdown(&self, grace: Duration) {
        tracing::info!(grace_secs = grace.as_secs(), "Shutting down orchestrator");
        self.cancel.cancel();

        let mut workers = self.workers.lock().await;
        let finished = tokio::time::timeout(
            grace,
            futures::future::join_all(workers.iter_mut()),
        )
        .await
        .is_ok();

        if !finished {
            let abandoned = self.shared.committer.running_ids();
            tracing::warn!(
                count = abandoned.len(),
                job_ids = ?abandoned,
                "Grace period elapsed, abandoning running jobs",
            );
            for handle in workers.iter() {
                handle.abort();
            }
        }
        workers.clear();

        tracing::info!(
            left_queued = self.shared.queue.len(),
            "Orchestrator shut down complete",
        );
    }
}
