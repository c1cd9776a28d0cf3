use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use aigpic_core::providers::ProviderRegistry;
use aigpic_events::EventBus;
use aigpic_pipeline::{Orchestrator, OrchestratorConfig, OutputStore};
use aigpic_provider::images_api::DEFAULT_TIMEOUT;
use aigpic_provider::ImagesApiClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aigpic_api::config::ServerConfig;
use aigpic_api::router::build_app_router;
use aigpic_api::state::AppState;
use aigpic_api::ws::FeedViewers;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "aigpic_api=debug,aigpic_pipeline=debug,aigpic_provider=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let providers = ProviderRegistry::load(&config.provider_config_path)
        .expect("Failed to load provider configuration");
    tracing::info!(
        configs = providers.configs().len(),
        default = %providers.default_name(),
        max_concurrent = providers.max_concurrent(),
        "Loaded provider configuration",
    );

    // --- Database ---
    let pool = aigpic_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    aigpic_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    aigpic_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Output directory ---
    let output = OutputStore::new(&config.output_dir);
    output
        .ensure_dir()
        .await
        .expect("Failed to create output directory");

    // --- Generation pipeline ---
    let client = ImagesApiClient::from_registry(&providers, DEFAULT_TIMEOUT)
        .expect("Failed to build provider HTTP clients");
    let event_bus = Arc::new(EventBus::default());

    let orchestrator = Orchestrator::start(
        pool.clone(),
        Arc::new(client),
        Arc::clone(&event_bus),
        output.clone(),
        OrchestratorConfig {
            max_concurrent: providers.max_concurrent(),
            ..OrchestratorConfig::default()
        },
    )
    .await
    .expect("Failed to start orchestrator");
    let orchestrator = Arc::new(orchestrator);

    // --- Live feed viewers ---
    let viewers = Arc::new(FeedViewers::new());

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        orchestrator: Arc::clone(&orchestrator),
        providers: Arc::new(providers),
        viewers: Arc::clone(&viewers),
        output,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    orchestrator
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    viewers.close_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
