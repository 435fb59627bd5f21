//! Shared test utilities for the ModSync workspace.
//!
//! Dev-dependency only, never published.
//!
//! - [`tree`]: [`TestTree`], a scratch install root with file helpers

pub mod tree;

pub use tree::TestTree;
