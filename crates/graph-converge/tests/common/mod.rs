//! Shared test utilities for graph-converge integration tests.
//!
//! This module provides:
//! - `TestHarness`, which owns an isolated in-memory service and builds
//!   controllers against it
//! - Builders for desired objects and assignment sets

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
