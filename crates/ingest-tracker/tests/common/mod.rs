//! Shared test utilities for ingest-tracker integration tests.
//!
//! This module provides:
//! - `MockBackend`, a scriptable in-memory `JobBackend`
//! - `TestHarness`, a tracker over an in-memory database and a mock backend

pub mod backend;
pub mod harness;

pub use backend::{MockBackend, Reply};
pub use harness::{job, settle, TestHarness};
