//! Handlers for the `/api/tasks` resource.

use aigpic_core::error::CoreError;
use aigpic_core::job::Job;
use aigpic_core::submission::{NewJobRequest, MAX_REQUESTED_COUNT, MIN_REQUESTED_COUNT};
use aigpic_core::types::JobId;
use aigpic_db::repositories::job_repo::DEFAULT_LIMIT;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::state::AppState;

/// Body of `POST /api/tasks`.
#[derive(Debug, Deserialize)]
pub struct SubmitTask {
    #[serde(default)]
    pub prompt: String,
    pub n: i64,
    /// Provider configuration; the registry default when absent or blank.
    #[serde(default)]
    pub config_name: Option<String>,
    /// Reference image for image-to-image generation (base64 or data URL).
    #[serde(default)]
    pub image_data: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitTaskResponse {
    pub task_id: JobId,
}

#[derive(Debug, Deserialize)]
pub struct ListTasksParams {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/tasks
///
/// Validate and queue a generation job. Returns as soon as the job is
/// persisted; progress arrives over `/ws/tasks`.
pub async fn submit_task(
    State(state): State<AppState>,
    Json(input): Json<SubmitTask>,
) -> AppResult<Json<SubmitTaskResponse>> {
    let requested_count = u32::try_from(input.n).map_err(|_| {
        CoreError::Validation(format!(
            "Requested image count must be between {MIN_REQUESTED_COUNT} and {MAX_REQUESTED_COUNT}, got {}",
            input.n
        ))
    })?;

    let requested = input
        .config_name
        .as_deref()
        .filter(|name| !name.trim().is_empty());
    let config_name = state
        .providers
        .resolve(requested)
        .map(|config| config.name.clone())
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "Unknown configuration '{}'",
                requested.unwrap_or_default()
            ))
        })?;

    let task_id = state
        .orchestrator
        .submit(NewJobRequest {
            prompt: input.prompt,
            requested_count,
            config_name,
            reference_image: input.image_data,
        })
        .await?;

    Ok(Json(SubmitTaskResponse { task_id }))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// GET /api/tasks?limit=20
///
/// Most recent jobs, newest first.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<ListTasksParams>,
) -> AppResult<Json<Vec<Job>>> {
    let jobs = state
        .orchestrator
        .list(params.limit.unwrap_or(DEFAULT_LIMIT))
        .await?;
    Ok(Json(jobs))
}

/// GET /api/tasks/{id}
///
/// An id that is not a valid job id is reported as not found.
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Job>> {
    let job_id: JobId = id.parse().map_err(|_| CoreError::NotFound {
        entity: "job",
        id: id.clone(),
    })?;
    let job = state.orchestrator.get(job_id).await?;
    Ok(Json(job))
}
