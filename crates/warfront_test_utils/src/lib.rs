//! # Warfront Test Utilities
//!
//! Shared testing utilities for all crates:
//! - World builders and small ready-made worlds
//! - A coastline terrain oracle for naval and placement tests
//! - Determinism test harness
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;

/// Re-export proptest for convenience.
pub use proptest;
