use axum::routing::get;
use axum::Router;

use crate::handlers::configs;
use crate::state::AppState;

/// Routes mounted at `/configs`.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(configs::list_configs))
}
