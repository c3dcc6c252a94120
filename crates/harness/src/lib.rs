//! Shared fixtures for integration tests: an in-memory store wrapper, a
//! two-party primary election, and the standard CVR grid used by the
//! tabulation scenarios.

pub mod fixtures;

pub use fixtures::*;
