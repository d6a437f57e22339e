//! Selective vectorization of HTA data for Canopy.
//!
//! Only the semantically meaningful part of a goal, branch or task is ever
//! embedded. Fast-changing scalars live in a per-project metadata sidecar, so
//! marking a task complete or changing its priority never touches the vector
//! store.
//!
//! # Features
//!
//! - `vector-lancedb`: Enable the LanceDB adapter in `canopy-vector`
//! - `vector-sqlite`: Enable the SQLite + sqlite-vec adapter in `canopy-vector`
//! - `vector-fastembed`: Enable local embedding generation in `canopy-vector`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    canopy-semantic                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SelectiveVectorizer                                        │
//! │  ├── EmbeddingPrompt (kind, structure, text)                │
//! │  ├── OperationCache<Vec<SemanticMatch>>                     │
//! │  └── corruption → recovery → degraded result                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  MetadataSidecar (per-project JSON documents)               │
//! │  RecoveryCoordinator (reset · cache clear · sidecar walk)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  canopy-vector: VectorStore · VectorProvider · Embedding    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use canopy_semantic::{HtaEntity, SelectiveVectorizer, SemanticConfig};
//! use canopy_vector::MockEmbeddingProvider;
//! use std::sync::Arc;
//!
//! let vectorizer = SelectiveVectorizer::from_config(
//!     &SemanticConfig::default(),
//!     "/var/lib/canopy/sidecar",
//!     Arc::new(MockEmbeddingProvider::new()),
//! );
//!
//! let task = HtaEntity::new("t1", "Outline the first chapter")
//!     .with_depth(2)
//!     .with_field("duration_minutes", 30);
//! vectorizer.vectorize_task("novel", &task).await?;
//!
//! for hit in vectorizer.find_similar_tasks("novel", "chapter outline", 5).await? {
//!     println!("{} ({:.2})", hit.local_id, hit.similarity);
//! }
//! ```

// Core modules (always available)
pub mod config;
pub mod prompt;
pub mod types;

// Persistence and recovery
pub mod recovery;
pub mod sidecar;

// Manager
pub mod manager;

// Re-exports: configuration
pub use config::{ContentConfig, DURATION_TOLERANCE, SemanticConfig};

// Re-exports: types
pub use prompt::EmbeddingPrompt;
pub use types::{
    BulkVectorizeReport, HtaEntity, HtaSnapshot, RecommendationContext, SemanticMatch,
    TypeCounts, TypeStatus, VectorizationStatus, VectorizationType, WriteOutcome,
};

// Re-exports: sidecar and recovery
pub use recovery::{RecoveryCoordinator, RecoveryReport};
pub use sidecar::{
    MetadataSidecar, RecoveryRecord, SidecarDocument, SidecarEntry, SidecarResetSummary,
};

// Re-exports: manager
pub use manager::SelectiveVectorizer;
