use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// State store location. Defaults to `~/.enricher/data/state.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub run: RunConfig,
    pub generation: GenerationConfig,
    pub storage: StorageConfig,
    /// Local directory for snapshot and report files.
    #[serde(default = "default_output_directory")]
    pub output_directory: String,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_output_directory() -> String {
    "output".to_string()
}

impl Config {
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(path)),
            None => crate::db::default_database_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CatalogConfig {
    Sqlite {
        path: String,
        #[serde(default = "default_table")]
        table: String,
    },
    Csv {
        path: String,
    },
}

fn default_table() -> String {
    "products".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Minimum spacing between consecutive external-service calls.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Upper bound on records attempted in one run.
    #[serde(default)]
    pub max_records: Option<usize>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Upload a progress snapshot every N attempted records.
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: usize,
    #[serde(default = "default_state_write_retries")]
    pub state_write_retries: u32,
    #[serde(default = "default_state_write_backoff_ms")]
    pub state_write_backoff_ms: u64,
}

fn default_batch_size() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_request_delay_ms() -> u64 {
    1000
}

fn default_workers() -> usize {
    1
}

fn default_snapshot_every() -> usize {
    25
}

fn default_state_write_retries() -> u32 {
    3
}

fn default_state_write_backoff_ms() -> u64 {
    100
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            request_delay_ms: default_request_delay_ms(),
            max_records: None,
            workers: default_workers(),
            snapshot_every: default_snapshot_every(),
            state_write_retries: default_state_write_retries(),
            state_write_backoff_ms: default_state_write_backoff_ms(),
        }
    }
}

impl RunConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn state_write_backoff(&self) -> Duration {
        Duration::from_millis(self.state_write_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub project_id: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_description_model")]
    pub description_model: String,
    /// Overrides `https://{location}-aiplatform.googleapis.com`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub access_token_file: Option<String>,
    #[serde(default = "default_access_token_env")]
    pub access_token_env: Option<String>,
}

fn default_location() -> String {
    "us-central1".to_string()
}

fn default_image_model() -> String {
    "imagen-3.0-generate-002".to_string()
}

fn default_description_model() -> String {
    "gemini-1.5-flash-001".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_access_token_env() -> Option<String> {
    Some("ENRICHER_ACCESS_TOKEN".to_string())
}

impl GenerationConfig {
    pub fn base_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com", self.location),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    Filesystem {
        root: String,
    },
    Gcs {
        bucket: String,
        #[serde(default)]
        prefix: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default)]
    pub filter: Option<String>,
}
