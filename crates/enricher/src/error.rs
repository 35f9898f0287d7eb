use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnricherError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The state store could not be reached or a transition could not be
    /// persisted after bounded retries. Fatal to a run.
    #[error("State store unavailable: {0}")]
    StateStore(#[from] crate::db::DatabaseError),

    /// The catalog could not be read. Fatal to a run.
    #[error("Catalog unavailable: {0}")]
    Source(#[from] SourceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Generation error: {0}")]
    Generation(#[from] crate::generation::GenerationError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

impl EnricherError {
    /// Returns true for connectivity-class failures that abort a run.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, EnricherError::StateStore(_) | EnricherError::Source(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Catalog database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to read catalog file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Catalog has no '{column}' column")]
    MissingColumn { column: String },

    #[error("Invalid product id '{value}': {reason}")]
    InvalidId { value: String, reason: String },

    #[error("Duplicate product id {0}")]
    DuplicateId(i64),

    #[error("Invalid catalog table name '{0}'")]
    InvalidTable(String),

    #[error("Catalog lock poisoned")]
    LockPoisoned,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload of '{key}' failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Upload of '{key}' rejected with status {status}: {body}")]
    UploadRejected {
        key: String,
        status: u16,
        body: String,
    },

    #[error("Invalid object key '{0}'")]
    InvalidKey(String),

    #[error("Failed to build storage client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to encode CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write report '{path}': {source}")]
    WriteReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to upload report: {0}")]
    Upload(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, EnricherError>;
