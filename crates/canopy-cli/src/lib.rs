//! Command-line interface for Canopy.
//!
//! Wraps the vectorization layer in a small operational CLI: health checks,
//! per-project status, ad-hoc semantic search, manual recovery and deletion.
//!
//! # Key Abstractions
//!
//! - [`CanopyConfig`]: confyg-loaded configuration, implements
//!   [`ConfigProvider`](canopy_core::traits::ConfigProvider)
//! - [`CanopyCli`]: logging setup and command dispatch

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;

pub use app::CanopyCli;
pub use cli::{CliArgs, Command, ConfigAction, ConfigCommand};
pub use config::{CanopyConfig, EmbeddingConfig};
