//! Worker loop: claim, execute, commit.

use std::sync::Arc;
use std::time::Instant;

use aigpic_core::job::{Job, PendingJob};
use aigpic_provider::GenerationRequest;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::commit::Transition;
use crate::orchestrator::Shared;

/// Failure message for a provider call that produced nothing.
const NO_IMAGES_ERROR: &str = "Provider returned no images";

/// Run one worker until `cancel` fires.
///
/// Cancellation only interrupts the wait for a job; an execution that has
/// started runs to completion.
pub(crate) async fn run(worker_id: usize, shared: Arc<Shared>, cancel: CancellationToken) {
    tracing::debug!(worker_id, "Worker started");

    loop {
        let pending = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            pending = shared.queue.claim() => pending,
        };

        let span = tracing::info_span!("job", job_id = %pending.job.job_id, worker_id);
        execute(&shared, pending).instrument(span).await;
    }

    tracing::debug!(worker_id, "Worker stopped");
}

async fn execute(shared: &Shared, pending: PendingJob) {
    let PendingJob {
        mut job,
        reference_image,
    } = pending;

    if let Err(e) = job.start(Utc::now()) {
        tracing::error!(error = %e, "Claimed job is not startable, skipping");
        shared.committer.forget(job.job_id);
        return;
    }

    match shared.committer.commit(&job, Transition::Running).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("Job was no longer queued in the store, skipping");
            return;
        }
        Err(e) => {
            fail(shared, job, format!("Internal error: could not record job start: {e}")).await;
            return;
        }
    }

    let request = GenerationRequest {
        prompt: job.prompt.clone(),
        count: job.requested_count,
        config_name: job.config_name.clone(),
        reference_image,
    };

    tracing::info!(
        config_name = %job.config_name,
        requested = job.requested_count,
        "Job running",
    );
    let started = Instant::now();
    let outcome = shared.client.generate(&request).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let payloads = match outcome {
        Ok(payloads) if payloads.is_empty() => {
            tracing::warn!(elapsed_ms, "Provider returned no images");
            fail(shared, job, NO_IMAGES_ERROR.to_string()).await;
            return;
        }
        Ok(payloads) => payloads,
        Err(e) => {
            tracing::warn!(elapsed_ms, error = %e, "Generation failed");
            fail(shared, job, e.to_string()).await;
            return;
        }
    };

    if payloads.len() < job.requested_count as usize {
        tracing::warn!(
            requested = job.requested_count,
            returned = payloads.len(),
            "Provider returned fewer images than requested",
        );
    }

    let filenames = match shared.output.save(&payloads).await {
        Ok(filenames) => filenames,
        Err(e) => {
            fail(shared, job, format!("Internal error: failed to store images: {e}")).await;
            return;
        }
    };

    let running = job.clone();
    if let Err(e) = job.succeed(filenames.clone(), Utc::now()) {
        shared.output.remove_all(&filenames).await;
        fail(shared, running, format!("Internal error: {e}")).await;
        return;
    }

    match shared.committer.commit(&job, Transition::Succeeded).await {
        Ok(true) => {
            tracing::info!(images = filenames.len(), elapsed_ms, "Job succeeded");
        }
        Ok(false) => {
            tracing::warn!("Job left running state before its results were recorded");
            shared.output.remove_all(&filenames).await;
        }
        Err(e) => {
            shared.output.remove_all(&filenames).await;
            fail(shared, running, format!("Internal error: could not record results: {e}")).await;
        }
    }
}

/// Move `job` to `failed` and persist it.
///
/// If even this write cannot be persisted the record stays `running` in the
/// store and is surfaced as interrupted on the next start.
async fn fail(shared: &Shared, mut job: Job, error: String) {
    if let Err(e) = job.fail(error, Utc::now()) {
        tracing::error!(error = %e, "Cannot mark job failed");
        shared.committer.forget(job.job_id);
        return;
    }

    match shared.committer.commit(&job, Transition::Failed).await {
        Ok(true) => {
            tracing::info!(error = job.error.as_deref().unwrap_or_default(), "Job failed");
        }
        Ok(false) => {
            tracing::warn!("Job was already terminal, failure not recorded");
        }
        Err(e) => {
            tracing::error!(error = %e, "Could not record job failure");
            shared.committer.forget(job.job_id);
        }
    }
}
