//! Named provider configurations and the worker concurrency ceiling.
//!
//! Loaded once at startup from a JSON file:
//!
//! ```json
//! {
//!   "api_configs": [
//!     { "name": "main", "base_url": "https://api.example.com", "api_key": "sk-...",
//!       "model": "grok-imagine-1.0", "proxy": null }
//!   ],
//!   "default": "main",
//!   "max_concurrent": 2
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Model used when a configuration does not name one.
pub const DEFAULT_MODEL: &str = "grok-imagine-1.0";
/// Worker count used when the file does not set `max_concurrent`.
pub const DEFAULT_MAX_CONCURRENT: usize = 2;
/// Upper bound for `max_concurrent`.
pub const MAX_CONCURRENT_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ProviderConfigError {
    #[error("Failed to read provider config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed provider config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid provider config: {0}")]
    Invalid(String),
}

/// One named provider endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Public view of a configuration. Never carries the API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSummary {
    pub name: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Deserialize)]
struct ProviderFile {
    #[serde(default)]
    api_configs: Vec<ProviderConfig>,
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    max_concurrent: Option<i64>,
}

/// Validated set of provider configurations.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    configs: Vec<ProviderConfig>,
    default_name: String,
    max_concurrent: usize,
}

impl ProviderRegistry {
    /// Read and validate the provider file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProviderConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ProviderConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ProviderConfigError> {
        let file: ProviderFile = serde_json::from_str(raw)?;
        Self::from_parts(file.api_configs, file.default, file.max_concurrent)
    }

    /// Build a registry from already-parsed configurations.
    ///
    /// `max_concurrent` is clamped to `1..=MAX_CONCURRENT_LIMIT`. An unknown
    /// or absent `default` falls back to the first configuration.
    pub fn from_parts(
        configs: Vec<ProviderConfig>,
        default: Option<String>,
        max_concurrent: Option<i64>,
    ) -> Result<Self, ProviderConfigError> {
        if configs.is_empty() {
            return Err(ProviderConfigError::Invalid(
                "at least one entry in api_configs is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for config in &configs {
            for (field, value) in [
                ("name", &config.name),
                ("base_url", &config.base_url),
                ("api_key", &config.api_key),
            ] {
                if value.trim().is_empty() {
                    return Err(ProviderConfigError::Invalid(format!(
                        "config '{}' has an empty {field}",
                        config.name
                    )));
                }
            }
            if !seen.insert(config.name.as_str()) {
                return Err(ProviderConfigError::Invalid(format!(
                    "duplicate config name '{}'",
                    config.name
                )));
            }
        }

        let default_name = default
            .filter(|name| configs.iter().any(|c| &c.name == name))
            .unwrap_or_else(|| configs[0].name.clone());

        let max_concurrent = max_concurrent
            .unwrap_or(DEFAULT_MAX_CONCURRENT as i64)
            .clamp(1, MAX_CONCURRENT_LIMIT as i64) as usize;

        Ok(Self {
            configs,
            default_name,
            max_concurrent,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.configs.iter().find(|c| c.name == name)
    }

    /// Resolve an optional requested name: `None` selects the default,
    /// an unknown name yields `None`.
    pub fn resolve(&self, name: Option<&str>) -> Option<&ProviderConfig> {
        match name {
            Some(name) => self.get(name),
            None => self.get(&self.default_name),
        }
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn configs(&self) -> &[ProviderConfig] {
        &self.configs
    }

    pub fn summaries(&self) -> Vec<ProviderSummary> {
        self.configs
            .iter()
            .map(|c| ProviderSummary {
                name: c.name.clone(),
                base_url: c.base_url.clone(),
                model: c.model.clone(),
            })
            .collect()
    }
}
