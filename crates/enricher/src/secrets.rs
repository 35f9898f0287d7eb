//! Access-token resolution for the generation and storage services.
//!
//! Sources are tried in order: inline value, token file, environment
//! variable. Obtaining the token (e.g. `gcloud auth print-access-token`)
//! is left to the deployment.

use secrecy::SecretString;

use crate::config::GenerationConfig;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No access token source configured (access_token, access_token_file or access_token_env)")]
    NoSourceProvided,

    #[error("Failed to read access token from '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Access token from {origin} is empty")]
    Empty { origin: String },
}

/// Resolves the bearer token configured for generation calls.
pub fn resolve_access_token(config: &GenerationConfig) -> Result<SecretString, SecretError> {
    resolve_secret(
        config.access_token.as_deref(),
        config.access_token_file.as_deref(),
        config.access_token_env.as_deref(),
    )
}

/// Resolves a secret from the first non-empty source.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString, SecretError> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        let content = std::fs::read_to_string(&expanded).map_err(|e| SecretError::FileRead {
            path: expanded.clone(),
            source: e,
        })?;
        let token = content.trim();
        if token.is_empty() {
            return Err(SecretError::Empty { origin: expanded });
        }
        return Ok(SecretString::from(token.to_string()));
    }

    if let Some(name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(name) {
            Ok(value) if value.trim().is_empty() => Err(SecretError::Empty {
                origin: format!("${}", name),
            }),
            Ok(value) => Ok(SecretString::from(value.trim().to_string())),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Expands a leading `~` to the user's home directory.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
