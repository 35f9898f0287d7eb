//! Shared test utilities for enricher integration tests.
//!
//! This module provides:
//! - Scripted fakes for the generation services and the artifact store
//! - `TestHarness` wiring an in-memory state store to those fakes

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::TestHarness;
