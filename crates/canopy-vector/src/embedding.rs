//! Embedding provider trait and mock implementation.
//!
//! The embedding model is opaque to the storage layer: it is a function from
//! `(text, dimension)` to a vector. Callers pick the dimension from the
//! vectorization type being stored, so a provider whose model cannot produce
//! the requested dimension must fail rather than truncate or pad.
//!
//! # Providers
//!
//! - `MockEmbeddingProvider`: Deterministic hashed bag-of-words vectors for testing
//! - `FastEmbedProvider`: Local embedding via fastembed (requires `vector-fastembed` feature)

use async_trait::async_trait;
use canopy_core::{Error, Result};

/// Trait for generating text embeddings.
///
/// The trait requires `Send + Sync` to allow sharing across async tasks.
/// Implementations wrapping thread-unsafe libraries handle their own
/// synchronization.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding of the given dimension for a single text.
    async fn embed(&self, text: &str, dimension: usize) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch of texts.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    async fn embed_batch(&self, texts: &[&str], dimension: usize) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text, dimension).await?);
        }
        Ok(results)
    }

    /// The provider name for diagnostics.
    fn name(&self) -> &str;
}

/// A mock embedding provider for testing.
///
/// Produces a feature-hashed bag of words: each lowercase alphanumeric token
/// is hashed (FNV-1a) into a bucket with a hash-derived sign, and the result
/// is unit-normalized. Identical texts give identical vectors and texts that
/// share words are closer than texts that do not, which is enough to exercise
/// ranking without a real model.
#[derive(Debug, Clone, Default)]
pub struct MockEmbeddingProvider;

impl MockEmbeddingProvider {
    /// Create a new mock provider.
    pub fn new() -> Self {
        Self
    }

    /// Generate a deterministic embedding from text.
    fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0f32; dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (hash % dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        // Normalize to unit vector
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }

        embedding
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str, dimension: usize) -> Result<Vec<f32>> {
        if dimension == 0 {
            return Err(Error::validation("embedding dimension must be > 0"));
        }
        Ok(Self::hashed_embedding(text, dimension))
    }

    async fn embed_batch(&self, texts: &[&str], dimension: usize) -> Result<Vec<Vec<f32>>> {
        if dimension == 0 {
            return Err(Error::validation("embedding dimension must be > 0"));
        }
        Ok(texts
            .iter()
            .map(|t| Self::hashed_embedding(t, dimension))
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::cosine_similarity;

    #[tokio::test]
    async fn test_mock_embed_single() {
        let provider = MockEmbeddingProvider::new();
        let embedding = provider.embed("hello world", 64).await.unwrap();

        assert_eq!(embedding.len(), 64);

        // Verify unit-normalized
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_embed_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let e1 = provider.embed("same text", 128).await.unwrap();
        let e2 = provider.embed("same text", 128).await.unwrap();

        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_mock_embed_shared_words_are_closer() {
        let provider = MockEmbeddingProvider::new();
        let base = provider.embed("write the api design doc", 384).await.unwrap();
        let near = provider.embed("review the api design", 384).await.unwrap();
        let far = provider.embed("buy groceries tomorrow", 384).await.unwrap();

        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[tokio::test]
    async fn test_mock_embed_batch() {
        let provider = MockEmbeddingProvider::new();
        let texts = vec!["hello", "world", "test"];
        let embeddings = provider.embed_batch(&texts, 8).await.unwrap();

        assert_eq!(embeddings.len(), 3);
        for emb in &embeddings {
            assert_eq!(emb.len(), 8);
        }
    }

    #[tokio::test]
    async fn test_mock_embed_empty_text_is_zero_vector() {
        let provider = MockEmbeddingProvider::new();
        let embedding = provider.embed("", 4).await.unwrap();

        assert_eq!(embedding, vec![0.0; 4]);
    }

    #[tokio::test]
    async fn test_mock_embed_zero_dimension() {
        let provider = MockEmbeddingProvider::new();
        assert!(provider.embed("x", 0).await.unwrap_err().is_validation());
    }

    #[test]
    fn test_trait_object_safety() {
        fn _assert_object_safe(_: &dyn EmbeddingProvider) {}
    }
}
