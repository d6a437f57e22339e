//! Vectorization types and the HTA data model as seen by the vectorizer.

use canopy_core::{Error, Result};
use canopy_vector::Metadata;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::sidecar::{RecoveryRecord, SidecarEntry};

// ============================================================================
// VectorizationType
// ============================================================================

/// What kind of HTA content a vector represents.
///
/// Each type fixes the embedding dimension, the entity kind used in vector
/// ids, the sidecar document that holds its metadata, and whether query
/// results for it may be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorizationType {
    Goal,
    Branch,
    Task,
    LearningEvent,
    UserContext,
    Breakthrough,
}

impl VectorizationType {
    /// All types.
    pub const ALL: [VectorizationType; 6] = [
        VectorizationType::Goal,
        VectorizationType::Branch,
        VectorizationType::Task,
        VectorizationType::LearningEvent,
        VectorizationType::UserContext,
        VectorizationType::Breakthrough,
    ];

    /// Embedding dimension.
    pub fn dimension(&self) -> usize {
        match self {
            VectorizationType::Goal
            | VectorizationType::Branch
            | VectorizationType::Task
            | VectorizationType::Breakthrough => 1536,
            VectorizationType::LearningEvent => 768,
            VectorizationType::UserContext => 384,
        }
    }

    /// Entity kind segment of vector ids.
    pub fn entity_kind(&self) -> &'static str {
        match self {
            VectorizationType::Goal => "goal",
            VectorizationType::Branch => "branch",
            VectorizationType::Task => "task",
            VectorizationType::LearningEvent => "learning",
            VectorizationType::UserContext => "context",
            VectorizationType::Breakthrough => "breakthrough",
        }
    }

    /// Sidecar document name (without extension).
    pub fn sidecar_document(&self) -> &'static str {
        match self {
            VectorizationType::Goal => "goal_metadata",
            VectorizationType::Branch => "branch_metadata",
            VectorizationType::Task => "task_metadata",
            VectorizationType::LearningEvent => "learning_metadata",
            VectorizationType::UserContext => "context_metadata",
            VectorizationType::Breakthrough => "breakthrough_metadata",
        }
    }

    /// Whether query results for this type may be cached.
    ///
    /// Learning events and user context churn too fast for cached results
    /// to stay useful.
    pub fn cache_eligible(&self) -> bool {
        !matches!(
            self,
            VectorizationType::LearningEvent | VectorizationType::UserContext
        )
    }

    /// Value stored under `vectorization_type` in vector metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorizationType::Goal => "goal",
            VectorizationType::Branch => "branch",
            VectorizationType::Task => "task",
            VectorizationType::LearningEvent => "learning_event",
            VectorizationType::UserContext => "user_context",
            VectorizationType::Breakthrough => "breakthrough",
        }
    }

    /// Look a type up by its entity kind.
    pub fn from_entity_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.entity_kind() == kind)
    }
}

impl fmt::Display for VectorizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VectorizationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s || t.entity_kind() == s)
            .ok_or_else(|| {
                Error::config(format!(
                    "Unknown vectorization type: '{s}'. Supported: goal, branch, task, learning, context, breakthrough"
                ))
            })
    }
}

// ============================================================================
// HTA input
// ============================================================================

/// One HTA node (goal, branch, task, ...) offered for vectorization.
///
/// Only `content` and the structural counts are embedded. Everything in
/// `fields` is fast-changing scalar data (`completed`, `priority`,
/// `duration_minutes`, ...) that goes to the sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtaEntity {
    /// Local id, unique within the project and type.
    pub id: String,

    /// Semantic text (title plus description).
    pub content: String,

    /// Depth in the tree; the goal is 0.
    #[serde(default)]
    pub depth: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Position among siblings.
    #[serde(default)]
    pub sibling_index: u32,

    #[serde(default)]
    pub prerequisite_count: u32,

    #[serde(default)]
    pub child_count: u32,

    /// Scalars kept out of the embedding.
    #[serde(flatten)]
    pub fields: Metadata,
}

impl HtaEntity {
    /// Create an entity with no structure or fields.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            depth: 0,
            parent_id: None,
            sibling_index: 0,
            prerequisite_count: 0,
            child_count: 0,
            fields: Metadata::new(),
        }
    }

    /// Set the depth.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Set the parent id.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set the sibling index.
    pub fn with_sibling_index(mut self, index: u32) -> Self {
        self.sibling_index = index;
        self
    }

    /// Set the prerequisite count.
    pub fn with_prerequisites(mut self, count: u32) -> Self {
        self.prerequisite_count = count;
        self
    }

    /// Set the child count.
    pub fn with_children(mut self, count: u32) -> Self {
        self.child_count = count;
        self
    }

    /// Add a sidecar scalar.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// The parts of a project's HTA that bulk vectorization covers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HtaSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<HtaEntity>,

    #[serde(default)]
    pub branches: Vec<HtaEntity>,

    #[serde(default)]
    pub tasks: Vec<HtaEntity>,
}

/// Per-type counts in a bulk report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    pub goals: usize,
    pub branches: usize,
    pub tasks: usize,
}

/// Outcome of [`SelectiveVectorizer::bulk_vectorize`](crate::SelectiveVectorizer::bulk_vectorize).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkVectorizeReport {
    /// Entities stored.
    pub vectorized: usize,
    /// Entities that failed or were skipped by a degraded write.
    pub errors: usize,
    /// Stored entities by type.
    pub types: TypeCounts,
}

/// Whether a write reached the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Applied,
    /// The backend was corrupted; recovery ran and the write was dropped.
    Degraded,
}

// ============================================================================
// Query output
// ============================================================================

/// A semantic search hit enriched with its sidecar row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticMatch {
    /// Full vector id.
    pub vector_id: String,
    pub project_id: String,
    pub local_id: String,
    pub vectorization_type: Option<VectorizationType>,
    /// Similarity in `[0, 1]`.
    pub similarity: f32,
    /// Content preview stored with the vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Current sidecar row, if one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar: Option<SidecarEntry>,
}

impl SemanticMatch {
    /// Look up a sidecar scalar.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.sidecar.as_ref().and_then(|s| s.fields.get(key))
    }
}

/// Inputs to task recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationContext {
    /// What the user wants to work on, in free text.
    pub query: String,

    /// Time the user has; tasks much longer than this are skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_minutes: Option<u32>,

    #[serde(default = "default_recommendation_limit")]
    pub limit: usize,
}

fn default_recommendation_limit() -> usize {
    5
}

impl RecommendationContext {
    /// Create a context for a free-text query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            available_minutes: None,
            limit: default_recommendation_limit(),
        }
    }

    /// Set the available time.
    pub fn with_available_minutes(mut self, minutes: u32) -> Self {
        self.available_minutes = Some(minutes);
        self
    }

    /// Set the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

// ============================================================================
// Status
// ============================================================================

/// Sidecar-derived status for one vectorization type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeStatus {
    pub total: usize,
    pub vectorized: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_vectorized: Option<String>,
}

/// Vectorization status of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorizationStatus {
    pub project_id: String,
    pub total_entities: usize,
    pub vectorized_entities: usize,
    /// Keyed by [`VectorizationType::as_str`].
    pub by_type: BTreeMap<String, TypeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_recovery: Option<RecoveryRecord>,
}

impl VectorizationStatus {
    /// Fraction of known entities currently vectorized.
    pub fn coverage(&self) -> f64 {
        if self.total_entities == 0 {
            0.0
        } else {
            self.vectorized_entities as f64 / self.total_entities as f64
        }
    }
}
