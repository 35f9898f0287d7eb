use std::path::Path;

use crate::catalog::sqlite::is_valid_table_name;
use crate::config::schema::{CatalogConfig, Config, StorageConfig};
use crate::error::ConfigError;

const SUPPORTED_VERSION: &str = "1.0";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

/// Checks the bounds the orchestrator relies on. Also called after CLI
/// overrides are applied.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_VERSION {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    let run = &config.run;
    if run.batch_size < 1 {
        return Err(invalid("run.batch_size must be at least 1"));
    }
    if run.max_attempts < 1 {
        return Err(invalid("run.max_attempts must be at least 1"));
    }
    if run.workers < 1 {
        return Err(invalid("run.workers must be at least 1"));
    }
    if run.snapshot_every < 1 {
        return Err(invalid("run.snapshot_every must be at least 1"));
    }
    if run.state_write_retries < 1 {
        return Err(invalid("run.state_write_retries must be at least 1"));
    }

    match &config.catalog {
        CatalogConfig::Sqlite { path, table } => {
            if path.trim().is_empty() {
                return Err(invalid("catalog.path must not be empty"));
            }
            if !is_valid_table_name(table) {
                return Err(invalid(format!(
                    "catalog.table '{}' is not a plain identifier",
                    table
                )));
            }
        }
        CatalogConfig::Csv { path } => {
            if path.trim().is_empty() {
                return Err(invalid("catalog.path must not be empty"));
            }
        }
    }

    match &config.storage {
        StorageConfig::Filesystem { root } => {
            if root.trim().is_empty() {
                return Err(invalid("storage.root must not be empty"));
            }
        }
        StorageConfig::Gcs { bucket, .. } => {
            if bucket.trim().is_empty() {
                return Err(invalid("storage.bucket must not be empty"));
            }
        }
    }

    if config.generation.project_id.trim().is_empty() {
        return Err(invalid("generation.project_id must not be empty"));
    }
    if config.generation.timeout_secs == 0 {
        return Err(invalid("generation.timeout_secs must be positive"));
    }

    Ok(())
}
