//! # scopedb testkit
//!
//! Test utilities for scopedb.
//!
//! This crate provides:
//! - Fixture entities ([`ParentScope`], [`ChildEntity`], [`SharedNote`])
//! - Repository helpers for the memory and log engines
//! - Property-based test generators using proptest
//! - A conformance suite any [`scopedb_core::ScopedRepository`] must pass
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scopedb_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn memory_engine_conforms() {
//!     run_conformance(&memory_repository()).await;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod conformance;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::conformance::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use conformance::run_conformance;
pub use fixtures::*;
pub use generators::*;
