pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod generation;
pub mod logging;
pub mod pipeline;
pub mod secrets;
pub mod state;
pub mod storage;

pub use catalog::{CatalogSource, MemoryCatalog, ProductRecord, SqliteCatalog};
pub use config::{load_config, Config};
pub use db::Database;
pub use error::{ConfigError, EnricherError, ExportError, Result, SourceError, StorageError};
pub use export::{consolidate, ConsolidatedReport, Consolidator, Exporter};
pub use generation::{DescriptionGenerator, GeneratedImage, GenerationError, ImageGenerator};
pub use pipeline::{Orchestrator, RunOptions, RunSummary};
pub use secrets::{resolve_access_token, resolve_secret, SecretError};
pub use state::{ProcessingState, ProcessingStatus, ProductId};
pub use storage::{ArtifactStore, FileStorage, GcsStorage};
