//! Handlers for the `/api/images` gallery.

use aigpic_core::error::CoreError;
use aigpic_core::types::{DbId, Timestamp};
use aigpic_db::repositories::image_repo::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use aigpic_db::repositories::ImageRepo;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListImagesParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ImageItem {
    pub id: DbId,
    pub filename: String,
    /// Where the file is served, `/output/{filename}`.
    pub url: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Serialize)]
pub struct ImagesPage {
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub items: Vec<ImageItem>,
}

#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
}

fn image_not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "image",
        id: id.to_string(),
    })
}

/// GET /api/images?page=1&page_size=16
pub async fn list_images(
    State(state): State<AppState>,
    Query(params): Query<ListImagesParams>,
) -> AppResult<Json<ImagesPage>> {
    let page = params.page.unwrap_or(1);
    let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE);

    if page < 1 {
        return Err(AppError::BadRequest("Page must be >= 1".to_string()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(AppError::BadRequest(format!(
            "Page size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    if (page - 1).checked_mul(page_size).is_none() {
        return Err(AppError::BadRequest("Page is out of range".to_string()));
    }

    let (images, total) = ImageRepo::list_page(&state.pool, page, page_size).await?;
    let items = images
        .into_iter()
        .map(|image| ImageItem {
            url: format!("/output/{}", image.filename),
            id: image.id,
            filename: image.filename,
            created_at: image.created_at,
        })
        .collect();

    Ok(Json(ImagesPage {
        page,
        page_size,
        total,
        items,
    }))
}

/// GET /api/images/{id}/prompt
pub async fn get_image_prompt(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<PromptResponse>> {
    let prompt = ImageRepo::find_prompt(&state.pool, id)
        .await?
        .ok_or_else(|| image_not_found(id))?;
    Ok(Json(PromptResponse { prompt }))
}

/// DELETE /api/images/{id}
///
/// Removes the gallery row, then the file. A file that is already gone or
/// cannot be removed is logged and does not fail the request.
pub async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DeleteResponse>> {
    let filename = ImageRepo::delete(&state.pool, id)
        .await?
        .ok_or_else(|| image_not_found(id))?;

    match state.output.remove(&filename).await {
        Ok(()) => tracing::info!(image_id = id, filename = %filename, "Image deleted"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(image_id = id, filename = %filename, "Image file already missing");
        }
        Err(e) => {
            tracing::error!(image_id = id, filename = %filename, error = %e, "Failed to delete image file");
        }
    }

    Ok(Json(DeleteResponse {
        message: "Image deleted successfully",
    }))
}
