//! Configuration for the vectorization layer.

use canopy_vector::{CacheConfig, CorruptionConfig, VectorStoreConfig};
use serde::{Deserialize, Serialize};

/// Tasks longer than `available_minutes` times this factor are not
/// recommended.
pub const DURATION_TOLERANCE: f64 = 1.2;

/// Settings for [`SelectiveVectorizer`](crate::SelectiveVectorizer).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SemanticConfig {
    #[serde(default)]
    pub vector: VectorStoreConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub corruption: CorruptionConfig,

    #[serde(default)]
    pub content: ContentConfig,
}

/// What is kept of entity text alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Characters of content stored in vector metadata for previews.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

fn default_preview_chars() -> usize {
    512
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            preview_chars: default_preview_chars(),
        }
    }
}
