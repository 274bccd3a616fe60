//! # planstore Testkit
//!
//! Test utilities for planstore.
//!
//! This crate provides:
//! - Test fixtures: engines over in-memory or temporary file stores, and
//!   sample collections and snapshots
//! - Property-based test generators using proptest
//! - A fault-injecting store for failure-path tests
//! - A log capture for asserting on warnings
//!
//! ## Usage
//!
//! ```rust,ignore
//! use planstore_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_engine() {
//!     let harness = TestPersistence::memory();
//!     harness.persistence.import_complete(two_project_snapshot()).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fault;
pub mod fixtures;
pub mod generators;
pub mod logs;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fault::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logs::*;
}

pub use fault::*;
pub use fixtures::*;
pub use generators::*;
pub use logs::*;
