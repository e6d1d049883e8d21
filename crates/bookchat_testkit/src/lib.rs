//! # BookChat Testkit
//!
//! Test utilities for BookChat.
//!
//! This crate provides:
//! - Store fixtures (in memory or in a temporary directory) and scenario builders
//! - Property-based generators for message content
//! - A scripted mirror for driving the sync engine through failures
//! - A crashable storage backend for recovery tests
//!
//! ## Usage
//!
//! ```rust
//! use bookchat_testkit::prelude::*;
//!
//! with_temp_store(|store| {
//!     store.create("hello").unwrap();
//!     assert_eq!(store.len(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod mirror;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::mirror::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use mirror::*;
