//! Error types for Canopy operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all Canopy crates. Uses `thiserror` for derive macros.
//!
//! The variants follow the storage engine's error taxonomy:
//!
//! | Variant | Meaning | Handling |
//! |---------|---------|----------|
//! | `ProviderInit` | Backend unreachable or misconfigured | Next strategy in the fallback chain |
//! | `Validation` | Malformed vector or embedding | Always surfaced |
//! | `Corruption` | Backend entered an inconsistent state | Recovery, then degraded result |
//! | `Query` | Any other backend failure | Surfaced to the caller |

use std::path::Path;
use thiserror::Error;

/// Errors that can occur in Canopy operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error with the path that caused it.
    #[error("I/O error at {path}: {source}")]
    IoPath {
        /// Path being accessed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Content not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A vector provider could not be initialized.
    #[error("Provider '{provider}' failed to initialize: {message}")]
    ProviderInit {
        /// Provider name.
        provider: String,
        /// Failure description.
        message: String,
    },

    /// A vector or embedding failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The backend reported a known corruption mode.
    #[error("Backend corruption: {0}")]
    Corruption(String),

    /// Generic backend query failure.
    #[error("Query error: {0}")]
    Query(String),

    /// Failure in an internal operation (task join, lock, encoding).
    #[error("Operation failed: {0}")]
    Operation(String),

    /// The store or provider has been closed.
    #[error("Closed: {0}")]
    Closed(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an I/O error annotated with a path.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::IoPath {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Create a provider initialization error.
    pub fn provider_init(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ProviderInit {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Create an operation error.
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Create a closed error.
    pub fn closed(msg: impl Into<String>) -> Self {
        Self::Closed(msg.into())
    }

    /// True for `Validation` errors.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// True for `ProviderInit` errors.
    pub fn is_provider_init(&self) -> bool {
        matches!(self, Self::ProviderInit { .. })
    }

    /// True for explicit `Corruption` errors.
    ///
    /// Message-based detection of backend corruption lives in
    /// `canopy_vector::corruption`; this only covers errors that were
    /// already classified at the source.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_))
    }
}

/// Result type alias using Canopy's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_and_display() {
        let err = Error::provider_init("qdrant", "connection refused");
        assert!(err.is_provider_init());
        assert_eq!(
            err.to_string(),
            "Provider 'qdrant' failed to initialize: connection refused"
        );

        let err = Error::validation("vector contains NaN at index 3");
        assert!(err.is_validation());
        assert!(err.to_string().contains("NaN"));

        assert!(Error::corruption("reset me").is_corruption());
        assert!(!Error::query("boom").is_corruption());
    }

    #[test]
    fn test_io_with_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::io_with_path(io, "/tmp/nowhere.json");
        let msg = err.to_string();
        assert!(msg.contains("/tmp/nowhere.json"));
        assert!(msg.contains("missing"));
    }

    #[test]
    fn test_json_from() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{nope");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }
}
