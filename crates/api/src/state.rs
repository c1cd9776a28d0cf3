use std::sync::Arc;

use aigpic_core::providers::ProviderRegistry;
use aigpic_pipeline::{Orchestrator, OutputStore};

use crate::config::ServerConfig;
use crate::ws::FeedViewers;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind an `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (gallery queries, health).
    pub pool: aigpic_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Job submission, queries and the live feed.
    pub orchestrator: Arc<Orchestrator>,
    /// Provider configurations, used to resolve the default and list summaries.
    pub providers: Arc<ProviderRegistry>,
    /// Clients connected to the live job feed.
    pub viewers: Arc<FeedViewers>,
    /// Generated image files.
    pub output: OutputStore,
}
