//! Application configuration for docenrich.
//!
//! User config lives at `~/.docenrich/docenrich.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file: it only names the environment variables
//! that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EnrichError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docenrich.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docenrich";

// ---------------------------------------------------------------------------
// Config structs (matching docenrich.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Webhook server and worker pool.
    #[serde(default)]
    pub server: ServerConfig,

    /// Collection service batch API.
    #[serde(default)]
    pub batch_api: BatchApiConfig,

    /// Entity scoring endpoint.
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address for the webhook endpoint.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Name of the env var holding the webhook JWT secret.
    #[serde(default = "default_webhook_secret_env")]
    pub webhook_secret_env: String,

    /// Number of batch workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pending batches accepted before the webhook starts refusing.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            webhook_secret_env: default_webhook_secret_env(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".into()
}
fn default_webhook_secret_env() -> String {
    "WEBHOOK_SECRET".into()
}
fn default_workers() -> usize {
    2
}
fn default_queue_capacity() -> usize {
    64
}

/// `[batch_api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchApiConfig {
    /// Base URL of the collection service (e.g. `https://api.example.com/instances/123`).
    #[serde(default)]
    pub url: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_batch_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BatchApiConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key_env: default_batch_api_key_env(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_batch_api_key_env() -> String {
    "WD_API_KEY".into()
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_timeout_secs() -> u64 {
    600
}

/// `[scoring]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Full scoring URL. When unset, built from `hostname` and `deployment_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub hostname: String,

    #[serde(default)]
    pub deployment_id: String,

    /// `version` query parameter of the deployment predictions API.
    #[serde(default = "default_scoring_api_version")]
    pub api_version: String,

    /// Name of the env var holding the bearer token.
    #[serde(default = "default_scoring_token_env")]
    pub api_token_env: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            hostname: String::new(),
            deployment_id: String::new(),
            api_version: default_scoring_api_version(),
            api_token_env: default_scoring_token_env(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_scoring_api_version() -> String {
    "2021-05-01".into()
}
fn default_scoring_token_env() -> String {
    "SCORING_API_TOKEN".into()
}

impl ScoringConfig {
    /// Resolve the scoring URL from `endpoint` or the deployment coordinates.
    pub fn endpoint_url(&self) -> Result<String> {
        if let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.is_empty()) {
            return Ok(endpoint.to_string());
        }
        if self.hostname.is_empty() || self.deployment_id.is_empty() {
            return Err(EnrichError::config(
                "scoring endpoint not configured: set scoring.endpoint or scoring.hostname + scoring.deployment_id",
            ));
        }
        Ok(format!(
            "https://{}/ml/v4/deployments/{}/predictions?version={}",
            self.hostname, self.deployment_id, self.api_version
        ))
    }
}

// ---------------------------------------------------------------------------
// Runtime settings (merged from config + CLI flags + env)
// ---------------------------------------------------------------------------

/// Network timeouts for one outbound client.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    /// Whole-request bound (connect + send + read).
    pub request: Duration,
}

impl Timeouts {
    pub fn from_secs(connect_secs: u64, request_secs: u64) -> Self {
        Self {
            connect: Duration::from_secs(connect_secs),
            request: Duration::from_secs(request_secs),
        }
    }
}

/// Resolved batch API client settings.
#[derive(Debug, Clone)]
pub struct BatchApiSettings {
    pub base_url: url::Url,
    pub api_key: String,
    pub timeouts: Timeouts,
}

impl BatchApiSettings {
    /// Resolve from the file config, reading the key from the environment.
    pub fn from_config(config: &BatchApiConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(EnrichError::config(
                "batch API URL not configured: set batch_api.url or WD_API_URL",
            ));
        }
        let base_url = url::Url::parse(&config.url)
            .map_err(|e| EnrichError::config(format!("invalid batch_api.url {}: {e}", config.url)))?;

        Ok(Self {
            base_url,
            api_key: resolve_secret(&config.api_key_env)?,
            timeouts: Timeouts::from_secs(config.connect_timeout_secs, config.timeout_secs),
        })
    }
}

/// Resolved scoring client settings.
#[derive(Debug, Clone)]
pub struct ScoringSettings {
    pub endpoint: String,
    pub api_token: String,
    pub timeouts: Timeouts,
}

impl ScoringSettings {
    /// Resolve from the file config, reading the token from the environment.
    pub fn from_config(config: &ScoringConfig) -> Result<Self> {
        Ok(Self {
            endpoint: config.endpoint_url()?,
            api_token: resolve_secret(&config.api_token_env)?,
            timeouts: Timeouts::from_secs(config.connect_timeout_secs, config.timeout_secs),
        })
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl From<&ServerConfig> for WorkerSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docenrich/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| EnrichError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docenrich/docenrich.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| EnrichError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| EnrichError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EnrichError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| EnrichError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EnrichError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the named environment variable.
pub fn resolve_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(EnrichError::config(format!(
            "secret not found. Set the {var_name} environment variable."
        ))),
    }
}
