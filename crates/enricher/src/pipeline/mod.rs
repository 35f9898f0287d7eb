//! Enrichment Orchestrator: drives catalog records through image
//! generation, description generation and artifact storage, persisting
//! every transition before the next external call.

pub mod config;
pub mod orchestrator;
pub mod progress;
pub mod summary;

pub use config::RunOptions;
pub use orchestrator::Orchestrator;
pub use progress::{NoopObserver, RunObserver};
pub use summary::{Outcome, RunSummary};
