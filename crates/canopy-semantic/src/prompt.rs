//! Embedding prompt construction.
//!
//! Only the semantic part of an entity reaches the embedding model: its
//! kind, its place in the tree and its text. Scalars such as completion or
//! priority are left out so that toggling them never requires re-embedding.

use std::fmt;

use crate::types::{HtaEntity, VectorizationType};

/// Line-oriented prompt rendered for the embedding model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingPrompt {
    pub kind: &'static str,
    pub depth: u32,
    pub sibling_index: u32,
    pub prerequisite_count: u32,
    pub child_count: u32,
    pub text: String,
}

impl EmbeddingPrompt {
    /// Prompt for an HTA entity.
    pub fn for_entity(ty: VectorizationType, entity: &HtaEntity) -> Self {
        Self {
            kind: ty.entity_kind(),
            depth: entity.depth,
            sibling_index: entity.sibling_index,
            prerequisite_count: entity.prerequisite_count,
            child_count: entity.child_count,
            text: entity.content.trim().to_string(),
        }
    }

    /// Prompt for free text, shaped like an entity with no structure.
    ///
    /// A query with the same text as a stored structureless entity renders
    /// to the same prompt and so embeds to the same vector.
    pub fn free_text(ty: VectorizationType, text: &str) -> Self {
        Self {
            kind: ty.entity_kind(),
            depth: 0,
            sibling_index: 0,
            prerequisite_count: 0,
            child_count: 0,
            text: text.trim().to_string(),
        }
    }

    /// Render the prompt.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EmbeddingPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "kind: {}", self.kind)?;
        // Zero-valued structure adds nothing but noise tokens.
        if self.depth > 0 {
            writeln!(f, "depth: {}", self.depth)?;
        }
        if self.sibling_index > 0 {
            writeln!(f, "position: {}", self.sibling_index)?;
        }
        if self.prerequisite_count > 0 {
            writeln!(f, "prerequisites: {}", self.prerequisite_count)?;
        }
        if self.child_count > 0 {
            writeln!(f, "children: {}", self.child_count)?;
        }
        write!(f, "content: {}", self.text)
    }
}
