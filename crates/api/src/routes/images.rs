use axum::routing::{delete, get};
use axum::Router;

use crate::handlers::images;
use crate::state::AppState;

/// Routes mounted at `/images`.
///
/// ```text
/// GET    /               -> list_images
/// DELETE /{id}           -> delete_image
/// GET    /{id}/prompt    -> get_image_prompt
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(images::list_images))
        .route("/{id}", delete(images::delete_image))
        .route("/{id}/prompt", get(images::get_image_prompt))
}
