//! `Server-Timing` header for the task endpoints.

use std::time::Instant;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

/// Path the timing header is attached to.
pub const TIMED_PATH: &str = "/api/tasks";

/// Measure handling time for `/api/tasks` and report it as
/// `Server-Timing: task;dur=<ms>`.
pub async fn task_timing(request: Request, next: Next) -> Response {
    if request.uri().path() != TIMED_PATH {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    if let Ok(value) = HeaderValue::from_str(&format!("task;dur={elapsed_ms:.2}")) {
        response.headers_mut().insert("server-timing", value);
    }
    tracing::debug!(%method, path = TIMED_PATH, elapsed_ms, "Task request timed");

    response
}
