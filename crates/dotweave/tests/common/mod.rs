//! Shared test utilities for dotweave integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs with temp backup/target trees and a state database
//! - Builder patterns for creating test configurations programmatically

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
