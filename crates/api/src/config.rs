use std::path::PathBuf;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for running from the project directory.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8989`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for running jobs, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// SQLite connection string (default: `sqlite://data/app.db`).
    pub database_url: String,
    /// Directory generated images are written to and served from.
    pub output_dir: PathBuf,
    /// Directory holding the front-end (`index.html` and assets).
    pub static_dir: PathBuf,
    /// Path of the provider configuration file.
    pub provider_config_path: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                  |
    /// |------------------------|--------------------------|
    /// | `HOST`                 | `0.0.0.0`                |
    /// | `PORT`                 | `8989`                   |
    /// | `CORS_ORIGINS`         | `http://localhost:8989`  |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                     |
    /// | `DATABASE_URL`         | `sqlite://data/app.db`   |
    /// | `OUTPUT_DIR`           | `output`                 |
    /// | `STATIC_DIR`           | `static`                 |
    /// | `AIGPIC_CONFIG_PATH`   | `data/configs.json`      |
    pub fn from_env() -> Self {
        let host = env_or("HOST", "0.0.0.0");

        let port: u16 = env_or("PORT", "8989")
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:8989")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_or("REQUEST_TIMEOUT_SECS", "30")
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = env_or("SHUTDOWN_TIMEOUT_SECS", "30")
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            database_url: env_or("DATABASE_URL", "sqlite://data/app.db"),
            output_dir: env_or("OUTPUT_DIR", "output").into(),
            static_dir: env_or("STATIC_DIR", "static").into(),
            provider_config_path: env_or("AIGPIC_CONFIG_PATH", "data/configs.json").into(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}
