//! Shared test utilities for newsroom integration tests.
//!
//! - `FakeSource` / `FakeAnalyzer`: deterministic collaborators
//! - `TestHarness`: in-memory database, config and orchestrator wiring

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::TestHarness;
