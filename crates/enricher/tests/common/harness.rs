//! Test harness for isolated orchestrator runs.
//!
//! The `TestHarness` bundles an in-memory state store, an in-memory catalog
//! of products named `product_<id>`, and scripted service fakes.

#![allow(dead_code)]

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use enricher::catalog::{MemoryCatalog, ProductRecord};
use enricher::db::{state_repo, Database};
use enricher::export::{consolidate, ConsolidatedReport};
use enricher::pipeline::{Orchestrator, RunObserver, RunOptions, RunSummary};
use enricher::state::{ProcessingState, ProcessingStatus, ProductId};

use super::fakes::{CrashSwitch, FakeDescriptions, FakeImages, MemoryStore, Script};

pub fn product(id: ProductId) -> ProductRecord {
    ProductRecord::new(id)
        .with_attribute("name", &format!("product_{}", id))
        .with_attribute("brand", "Acme")
        .with_attribute("category", "Home")
        .with_attribute("retail_price", "19.99")
}

pub fn name(id: ProductId) -> String {
    format!("product_{}", id)
}

/// The parts of a state that must match between equivalent runs.
pub type Essentials = (
    ProductId,
    ProcessingStatus,
    u32,
    Option<String>,
    Option<String>,
    Option<String>,
);

pub fn essentials(state: &ProcessingState) -> Essentials {
    (
        state.id,
        state.status,
        state.attempt_count,
        state.image_uri.clone(),
        state.description.clone(),
        state.last_error.clone(),
    )
}

pub struct TestHarness {
    pub db: Database,
    pub catalog: Arc<MemoryCatalog>,
    pub images: Arc<FakeImages>,
    pub descriptions: Arc<FakeDescriptions>,
    pub store: Arc<MemoryStore>,
    pub crash: Arc<CrashSwitch>,
}

impl TestHarness {
    pub fn new(ids: impl IntoIterator<Item = ProductId>) -> Self {
        Self::scripted(ids, Script::default(), Script::default())
    }

    pub fn scripted(
        ids: impl IntoIterator<Item = ProductId>,
        image_script: Script,
        description_script: Script,
    ) -> Self {
        let crash = Arc::new(CrashSwitch::default());
        Self::with_store(
            ids,
            image_script,
            description_script,
            MemoryStore::new(Arc::clone(&crash)),
            crash,
        )
    }

    pub fn with_store(
        ids: impl IntoIterator<Item = ProductId>,
        image_script: Script,
        description_script: Script,
        store: MemoryStore,
        crash: Arc<CrashSwitch>,
    ) -> Self {
        let catalog = MemoryCatalog::new(ids.into_iter().map(product).collect())
            .expect("Failed to build catalog");
        Self {
            db: Database::open_in_memory().expect("Failed to open state store"),
            catalog: Arc::new(catalog),
            images: Arc::new(FakeImages::new(image_script, Arc::clone(&crash))),
            descriptions: Arc::new(FakeDescriptions::new(
                description_script,
                Arc::clone(&crash),
            )),
            store: Arc::new(store),
            crash,
        }
    }

    /// A fresh orchestrator over the shared state store, as a restarted
    /// process would build it.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.db.clone(),
            self.catalog.clone(),
            self.images.clone(),
            self.descriptions.clone(),
            self.store.clone(),
        )
    }

    pub fn options(&self, max_attempts: u32) -> RunOptions {
        let mut options = RunOptions::new(2, max_attempts, Duration::ZERO);
        options.state_write_backoff = Duration::from_millis(1);
        options
    }

    pub fn run(&self, max_attempts: u32) -> RunSummary {
        self.orchestrator()
            .run(&self.options(max_attempts))
            .expect("Run failed")
    }

    pub fn run_observed(&self, max_attempts: u32, observer: Arc<dyn RunObserver>) -> RunSummary {
        self.orchestrator()
            .with_observer(observer)
            .run(&self.options(max_attempts))
            .expect("Run failed")
    }

    /// Runs until completion or an injected crash. Returns `true` if the
    /// run crashed.
    pub fn run_catching_crash(&self, max_attempts: u32) -> bool {
        let orchestrator = self.orchestrator();
        let options = self.options(max_attempts);
        catch_unwind(AssertUnwindSafe(|| orchestrator.run(&options))).is_err()
    }

    pub fn state(&self, id: ProductId) -> ProcessingState {
        state_repo::get(&self.db, id)
            .expect("State lookup failed")
            .unwrap_or_else(|| panic!("No state for product {}", id))
    }

    pub fn states(&self) -> Vec<ProcessingState> {
        state_repo::all(&self.db).expect("State listing failed")
    }

    pub fn essentials(&self) -> Vec<Essentials> {
        self.states().iter().map(essentials).collect()
    }

    pub fn consolidate(&self) -> ConsolidatedReport {
        consolidate(self.catalog.as_ref(), &self.db, 2).expect("Consolidation failed")
    }
}
