//! End-to-end orchestrator tests against a real store and scripted providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use aigpic_core::error::CoreError;
use aigpic_core::job::{Job, JobStatus};
use aigpic_core::submission::NewJobRequest;
use aigpic_core::types::JobId;
use aigpic_db::repositories::{ImageRepo, JobRepo};
use aigpic_events::EventBus;
use aigpic_pipeline::{
    Orchestrator, OrchestratorConfig, OutputStore, PipelineError, RetryPolicy, INTERRUPTED_ERROR,
};
use aigpic_provider::{GenerationClient, GenerationRequest, ImagePayload, ProviderError};
use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Utc;
use image::ImageFormat;
use sqlx::SqlitePool;

// ---------------------------------------------------------------------------
// Scripted provider
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Behavior {
    /// Return as many images as requested.
    Echo,
    /// Return no images.
    Empty,
    /// Fail with a timeout.
    Timeout,
    /// Never return.
    Hang,
}

struct ScriptedClient {
    behavior: Behavior,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedClient {
    fn new(behavior: Behavior) -> Arc<Self> {
        Self::with_delay(behavior, Duration::ZERO)
    }

    fn with_delay(behavior: Behavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ImagePayload>, ProviderError> {
        self.calls.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        let result = match self.behavior {
            Behavior::Echo => Ok((0..request.count)
                .map(|i| ImagePayload::new(vec![0x89, b'P', i as u8], ImageFormat::Png))
                .collect()),
            Behavior::Empty => Ok(Vec::new()),
            Behavior::Timeout => Err(ProviderError::Timeout(Duration::from_secs(300))),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn has_config(&self, config_name: &str) -> bool {
        config_name == "default"
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn start(
    pool: &SqlitePool,
    client: Arc<ScriptedClient>,
    max_concurrent: usize,
    output: &tempfile::TempDir,
) -> Orchestrator {
    Orchestrator::start(
        pool.clone(),
        client,
        Arc::new(EventBus::default()),
        OutputStore::new(output.path()),
        OrchestratorConfig {
            max_concurrent,
            retry: RetryPolicy::default(),
        },
    )
    .await
    .unwrap()
}

fn request(prompt: &str, count: u32) -> NewJobRequest {
    NewJobRequest {
        prompt: prompt.to_string(),
        requested_count: count,
        config_name: "default".to_string(),
        reference_image: None,
    }
}

async fn wait_for<F>(orchestrator: &Orchestrator, job_id: JobId, done: F) -> Job
where
    F: Fn(&Job) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let job = orchestrator.get(job_id).await.unwrap();
        if done(&job) {
            return job;
        }
        assert!(Instant::now() < deadline, "timed out waiting on job {job_id}: {job:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_terminal(orchestrator: &Orchestrator, job_id: JobId) -> Job {
    wait_for(orchestrator, job_id, |j| j.status.is_terminal()).await
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn red_fox_with_two_images_succeeds(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let orchestrator = start(&pool, ScriptedClient::new(Behavior::Echo), 2, &output).await;

    let job_id = orchestrator.submit(request("a red fox", 2)).await.unwrap();
    let job = wait_terminal(&orchestrator, job_id).await;

    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.results.len(), 2);
    assert!(job.error.is_none());
    job.check_invariants().unwrap();
    for filename in &job.results {
        assert!(output.path().join(filename).exists());
    }

    let history = orchestrator.list(20).await.unwrap();
    assert_eq!(history[0].job_id, job_id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_config_is_rejected_without_a_record(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let orchestrator = start(&pool, ScriptedClient::new(Behavior::Echo), 2, &output).await;

    let mut req = request("a red fox", 1);
    req.config_name = "nonexistent".to_string();
    let err = orchestrator.submit(req).await.unwrap_err();

    assert_matches!(err, PipelineError::Core(CoreError::Validation(_)));
    assert!(orchestrator.list(20).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_prompt_and_count_are_rejected(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let orchestrator = start(&pool, ScriptedClient::new(Behavior::Echo), 2, &output).await;

    assert_matches!(
        orchestrator.submit(request("  ", 1)).await,
        Err(PipelineError::Core(CoreError::Validation(_)))
    );
    assert_matches!(
        orchestrator.submit(request("fox", 11)).await,
        Err(PipelineError::Core(CoreError::Validation(_)))
    );
    assert!(orchestrator.list(20).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn zero_images_fails_the_job(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let orchestrator = start(&pool, ScriptedClient::new(Behavior::Empty), 2, &output).await;

    let job_id = orchestrator.submit(request("a red fox", 2)).await.unwrap();
    let job = wait_terminal(&orchestrator, job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("Provider returned no images"));
    assert!(job.results.is_empty());
    job.check_invariants().unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn provider_error_becomes_job_error(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let orchestrator = start(&pool, ScriptedClient::new(Behavior::Timeout), 2, &output).await;

    let job_id = orchestrator.submit(request("a red fox", 1)).await.unwrap();
    let job = wait_terminal(&orchestrator, job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("timed out"));
    assert!(job.started_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn reference_image_clamps_count_to_one(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new(Behavior::Echo);
    let orchestrator = start(&pool, Arc::clone(&client), 2, &output).await;

    let mut req = request("make it blue", 4);
    req.reference_image = Some("data:image/png;base64,AAAA".to_string());
    let job_id = orchestrator.submit(req).await.unwrap();
    let job = wait_terminal(&orchestrator, job_id).await;

    assert_eq!(job.requested_count, 1);
    assert_eq!(job.results.len(), 1);
    let calls = client.calls();
    assert_eq!(calls[0].count, 1);
    assert_eq!(
        calls[0].reference_image.as_deref(),
        Some("data:image/png;base64,AAAA")
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unwritable_output_fails_the_job(pool: SqlitePool) {
    let scratch = tempfile::tempdir().unwrap();
    // A regular file where the output directory's parent should be.
    let blocker = scratch.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let orchestrator = Orchestrator::start(
        pool.clone(),
        ScriptedClient::new(Behavior::Echo),
        Arc::new(EventBus::default()),
        OutputStore::new(blocker.join("images")),
        OrchestratorConfig::default(),
    )
    .await
    .unwrap();

    let job_id = orchestrator.submit(request("a red fox", 2)).await.unwrap();
    let job = wait_terminal(&orchestrator, job_id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(
        job.error.as_deref().unwrap().starts_with("Internal error"),
        "error was {:?}",
        job.error
    );
    assert!(job.results.is_empty());
    job.check_invariants().unwrap();

    let (images, total) = ImageRepo::list_page(&pool, 1, 16).await.unwrap();
    assert_eq!(total, 0);
    assert!(images.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn lost_store_leaves_workers_healthy(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let client = ScriptedClient::with_delay(Behavior::Echo, Duration::from_millis(300));
    let orchestrator = start(&pool, Arc::clone(&client), 1, &output).await;

    let job_id = orchestrator.submit(request("a red fox", 1)).await.unwrap();
    wait_for(&orchestrator, job_id, |j| j.status == JobStatus::Running).await;

    // Every write after this point fails, including the failure record.
    pool.close().await;

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let stats = orchestrator.stats();
        if stats.queued + stats.running == 0 {
            break;
        }
        assert!(Instant::now() < deadline, "job never left the active index");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(client.calls().len(), 1);

    // An idle worker exits on cancel well inside the grace period.
    let started = Instant::now();
    orchestrator.shutdown(Duration::from_secs(5)).await;
    assert!(started.elapsed() < Duration::from_secs(1));

    // The written files were rolled back with the lost commit.
    assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), 0);
}

// ---------------------------------------------------------------------------
// Admission and concurrency
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn never_more_than_capacity_running(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let client = ScriptedClient::with_delay(Behavior::Echo, Duration::from_millis(50));
    let orchestrator = start(&pool, Arc::clone(&client), 2, &output).await;

    let mut ids = Vec::new();
    for i in 0..6 {
        ids.push(orchestrator.submit(request(&format!("p{i}"), 1)).await.unwrap());
    }
    for id in ids {
        assert_eq!(wait_terminal(&orchestrator, id).await.status, JobStatus::Succeeded);
    }

    assert!(client.peak() <= 2, "peak concurrency was {}", client.peak());
    assert_eq!(client.calls().len(), 6);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn jobs_are_admitted_in_submission_order(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let client = ScriptedClient::with_delay(Behavior::Echo, Duration::from_millis(5));
    let orchestrator = start(&pool, Arc::clone(&client), 1, &output).await;

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(orchestrator.submit(request(&format!("p{i}"), 1)).await.unwrap());
    }
    for id in &ids {
        wait_terminal(&orchestrator, *id).await;
    }

    let prompts: Vec<String> = client.calls().into_iter().map(|c| c.prompt).collect();
    assert_eq!(prompts, ["p0", "p1", "p2", "p3", "p4"]);

    // Started in admission order as well.
    let mut started = Vec::new();
    for id in &ids {
        started.push(orchestrator.get(*id).await.unwrap().started_at.unwrap());
    }
    assert!(started.windows(2).all(|w| w[0] <= w[1]));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stats_track_queued_and_running(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let orchestrator = start(&pool, ScriptedClient::new(Behavior::Hang), 1, &output).await;

    let first = orchestrator.submit(request("p0", 1)).await.unwrap();
    orchestrator.submit(request("p1", 1)).await.unwrap();
    orchestrator.submit(request("p2", 1)).await.unwrap();
    wait_for(&orchestrator, first, |j| j.status == JobStatus::Running).await;

    // The active index is updated just after the store write lands.
    let deadline = Instant::now() + Duration::from_secs(1);
    while orchestrator.stats().running == 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let stats = orchestrator.stats();
    assert_eq!(stats.running, 1);
    assert_eq!(stats.queued, 2);
    assert_eq!(stats.max_concurrent, 1);

    orchestrator.shutdown(Duration::from_millis(50)).await;
}

// ---------------------------------------------------------------------------
// Queries and fan-out
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn get_is_idempotent_and_unknown_is_not_found(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let orchestrator = start(&pool, ScriptedClient::new(Behavior::Echo), 2, &output).await;

    let job_id = orchestrator.submit(request("fox", 1)).await.unwrap();
    wait_terminal(&orchestrator, job_id).await;

    let a = orchestrator.get(job_id).await.unwrap();
    let b = orchestrator.get(job_id).await.unwrap();
    assert_eq!(a, b);

    assert_matches!(
        orchestrator.get(uuid::Uuid::now_v7()).await,
        Err(PipelineError::Core(CoreError::NotFound { entity: "job", .. }))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn subscriber_sees_every_transition_in_order(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let orchestrator = start(&pool, ScriptedClient::new(Behavior::Echo), 2, &output).await;

    let mut feed = orchestrator.subscribe(15).await.unwrap();
    assert!(feed.snapshot.is_empty());

    let job_id = orchestrator.submit(request("a red fox", 2)).await.unwrap();

    let mut statuses = Vec::new();
    while statuses.last() != Some(&JobStatus::Succeeded) {
        let event = tokio::time::timeout(Duration::from_secs(5), feed.updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.job.job_id, job_id);
        statuses.push(event.job.status);
    }
    assert_eq!(
        statuses,
        [JobStatus::Queued, JobStatus::Running, JobStatus::Succeeded]
    );

    // The last event carries the same record a pull query returns.
    let pulled = orchestrator.get(job_id).await.unwrap();
    assert_eq!(pulled.results.len(), 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn snapshot_is_limited_and_newest_first(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let orchestrator = start(&pool, ScriptedClient::new(Behavior::Hang), 1, &output).await;

    let mut ids = Vec::new();
    for i in 0..20 {
        ids.push(orchestrator.submit(request(&format!("p{i}"), 1)).await.unwrap());
    }

    let feed = orchestrator.subscribe(15).await.unwrap();
    assert_eq!(feed.snapshot.len(), 15);
    assert_eq!(feed.snapshot[0].job_id, ids[19]);
    assert_eq!(feed.snapshot[14].job_id, ids[5]);

    orchestrator.shutdown(Duration::from_millis(50)).await;
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn restart_fails_running_and_resumes_queued(pool: SqlitePool) {
    let mut interrupted = Job::new_queued(uuid::Uuid::now_v7(), "was running", 1, "default", Utc::now());
    JobRepo::create(&pool, &interrupted, None).await.unwrap();
    interrupted.start(Utc::now()).unwrap();
    JobRepo::mark_running(&pool, &interrupted).await.unwrap();

    let waiting = Job::new_queued(
        uuid::Uuid::now_v7(),
        "was queued",
        1,
        "default",
        Utc::now() + chrono::Duration::milliseconds(1),
    );
    JobRepo::create(&pool, &waiting, Some("data:image/png;base64,AAAA"))
        .await
        .unwrap();

    let output = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new(Behavior::Echo);
    let orchestrator = start(&pool, Arc::clone(&client), 1, &output).await;

    let failed = orchestrator.get(interrupted.job_id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some(INTERRUPTED_ERROR));
    failed.check_invariants().unwrap();

    let resumed = wait_terminal(&orchestrator, waiting.job_id).await;
    assert_eq!(resumed.status, JobStatus::Succeeded);
    assert_eq!(
        client.calls()[0].reference_image.as_deref(),
        Some("data:image/png;base64,AAAA")
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn shutdown_abandons_jobs_past_grace(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let orchestrator = start(&pool, ScriptedClient::new(Behavior::Hang), 1, &output).await;

    let job_id = orchestrator.submit(request("forever", 1)).await.unwrap();
    wait_for(&orchestrator, job_id, |j| j.status == JobStatus::Running).await;

    let started = Instant::now();
    orchestrator.shutdown(Duration::from_millis(100)).await;
    assert!(started.elapsed() < Duration::from_secs(2));

    // Left for the next start to surface.
    let job = orchestrator.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Running);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn shutdown_waits_for_jobs_within_grace(pool: SqlitePool) {
    let output = tempfile::tempdir().unwrap();
    let client = ScriptedClient::with_delay(Behavior::Echo, Duration::from_millis(100));
    let orchestrator = start(&pool, client, 1, &output).await;

    let job_id = orchestrator.submit(request("quick", 1)).await.unwrap();
    wait_for(&orchestrator, job_id, |j| j.status == JobStatus::Running).await;

    orchestrator.shutdown(Duration::from_secs(5)).await;
    let job = orchestrator.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
}
