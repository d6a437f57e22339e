//! Utility modules shared across Canopy crates.

pub mod files;
