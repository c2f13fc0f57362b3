//! # arcvault testkit
//!
//! Test utilities for arcvault.
//!
//! This crate provides:
//! - Temporary repositories and store helpers
//! - Property-based test generators using proptest
//! - Crash damage helpers and a recovery harness
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use arcvault_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_repository() {
//!     with_temp_repo(|repo| {
//!         let artifact = repo.add_committed("test", "au1", "http://x/", "body");
//!         assert_eq!(repo.read(&artifact), b"body");
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
