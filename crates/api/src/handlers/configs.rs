//! Handler for `/api/configs`.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Public view of one provider configuration.
#[derive(Debug, Serialize)]
pub struct ConfigSummary {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub max_concurrent: usize,
}

#[derive(Debug, Serialize)]
pub struct ConfigList {
    pub configs: Vec<ConfigSummary>,
    pub default: String,
}

/// GET /api/configs
///
/// Lists configured providers without their API keys.
pub async fn list_configs(State(state): State<AppState>) -> Json<ConfigList> {
    let max_concurrent = state.orchestrator.max_concurrent();
    let configs = state
        .providers
        .summaries()
        .into_iter()
        .map(|summary| ConfigSummary {
            name: summary.name,
            base_url: summary.base_url,
            model: summary.model,
            max_concurrent,
        })
        .collect();

    Json(ConfigList {
        configs,
        default: state.providers.default_name().to_string(),
    })
}
