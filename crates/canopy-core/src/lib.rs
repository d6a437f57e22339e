//! Canopy Core: shared errors, traits, and file utilities.
//!
//! This crate provides the foundational types used across all Canopy crates.
//! It has no internal Canopy dependencies.
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`traits`]: Configuration provider abstraction
//! - [`util`]: Async JSON file helpers

pub mod error;
pub mod traits;
pub mod util;

// Re-export key types at crate root for convenience
pub use error::{Error, Result};
pub use traits::ConfigProvider;
