//! Vector storage for Canopy.
//!
//! This crate provides a provider-agnostic vector store: one async contract
//! implemented by several backends, an orchestrator that picks a working
//! backend through a fallback chain, and the supporting pieces the
//! vectorization layer needs (embedding providers, vector normalization, an
//! operation cache and corruption detection).
//!
//! # Features
//!
//! - `vector-lancedb`: Enable the LanceDB adapter
//! - `vector-sqlite`: Enable the SQLite + sqlite-vec adapter
//! - `vector-fastembed`: Enable local embedding generation via fastembed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     canopy-vector                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  VectorStore (fallback chain, self-test, lifecycle)         │
//! │  ├── ProviderStrategy (ConfiguredStrategy, injectable)      │
//! │  └── RecoveryHook (run on corruption signatures)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  VectorProvider trait                                       │
//! │  ├── FlatFileProvider (always available, last resort)       │
//! │  ├── QdrantProvider (REST)                                  │
//! │  ├── SqliteProvider (feature: vector-sqlite)                │
//! │  └── LancedbProvider (feature: vector-lancedb)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider trait                                    │
//! │  ├── MockEmbeddingProvider (always available)               │
//! │  └── FastEmbedProvider (feature: vector-fastembed)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  OperationCache · CorruptionDetector · normalize            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use canopy_vector::{CorruptionDetector, QueryOptions, VectorStore, VectorStoreConfig};
//! use std::sync::Arc;
//!
//! let mut config = VectorStoreConfig::default();
//! config.resolve_paths(std::path::Path::new("/var/lib/canopy/vectors"));
//!
//! let store = VectorStore::from_config(&config, Arc::new(CorruptionDetector::default()));
//! let status = store.initialize().await?;
//! println!("using {} (fallback: {})", status.provider_name, status.fallback_used);
//!
//! let provider = store.provider().await?;
//! provider.upsert_vector("alpha:task:t1", &embedding, &metadata).await?;
//! let hits = provider.query_vectors(&embedding, &QueryOptions::new(5)).await?;
//! ```

// Core modules (always available)
pub mod embedding;
pub mod normalize;
pub mod provider;
pub mod types;

// Storage orchestration
pub mod providers;
pub mod store;

// Supporting services
pub mod cache;
pub mod corruption;

// Feature-gated modules
#[cfg(feature = "vector-fastembed")]
pub mod fastembed;

// Re-exports: core types
pub use types::{
    Metadata, ProviderConfig, ProviderKind, ProviderMode, ProviderStatus, ProvidersConfig,
    QueryOptions, ScoredRecord, VectorId, VectorRecord, VectorStoreConfig, namespace_prefix,
};

// Re-exports: traits
pub use embedding::{EmbeddingProvider, MockEmbeddingProvider};
pub use provider::VectorProvider;

// Re-exports: orchestrator
pub use store::{
    ConfiguredStrategy, ProviderStrategy, RecoveryHook, StoreState, StoreStatus, VectorStore,
    strategies_from_config,
};

// Re-exports: providers
pub use providers::{FlatFileProvider, QdrantProvider, build_provider};

// Re-exports: cache and corruption
pub use cache::{CacheConfig, CacheKey, CacheStats, OperationCache};
pub use corruption::{CorruptionConfig, CorruptionDetector};

// Feature-gated re-exports
#[cfg(feature = "vector-fastembed")]
pub use self::fastembed::FastEmbedProvider;

#[cfg(feature = "vector-lancedb")]
pub use providers::LancedbProvider;

#[cfg(feature = "vector-sqlite")]
pub use providers::SqliteProvider;
