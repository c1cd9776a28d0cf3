pub mod configs;
pub mod health;
pub mod images;
pub mod tasks;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api` route tree.
///
/// ```text
/// /configs                       provider summaries
/// /tasks                         list, submit
/// /tasks/{id}                    get
/// /images                        gallery page
/// /images/{id}                   delete
/// /images/{id}/prompt            prompt of one image
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/configs", configs::router())
        .nest("/tasks", tasks::router())
        .nest("/images", images::router())
}

/// Live job feed, mounted at the root (not under `/api`).
pub fn ws_router() -> Router<AppState> {
    Router::new().route("/ws/tasks", get(ws::ws_handler))
}
