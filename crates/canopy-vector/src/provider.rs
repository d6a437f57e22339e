//! The `VectorProvider` contract.
//!
//! Every backend adapter implements this trait. The orchestrator only ever
//! talks to `Arc<dyn VectorProvider>`, so adapters are interchangeable at
//! runtime and selected by [`ProviderKind`] rather than by probing for
//! methods.
//!
//! # Contract
//!
//! - `initialize` is idempotent.
//! - `upsert_vector` is last-write-wins and validates the vector (via
//!   [`crate::normalize::prepare_vector`]) before any I/O.
//! - `query_vectors` returns similarities in `[0, 1]`, drops results below the
//!   threshold, sorts descending and truncates to the limit. Use
//!   [`finalize_results`] to apply those steps uniformly.
//! - `delete_namespace` and `list_vectors` match ids by prefix.
//! - `close` is safe to call more than once.

use async_trait::async_trait;
use canopy_core::Result;

use crate::types::{
    Metadata, ProviderKind, ProviderStatus, QueryOptions, ScoredRecord, VectorRecord,
};

/// Capability interface for vector storage backends.
#[async_trait]
pub trait VectorProvider: Send + Sync {
    /// Connect to the backend and make sure the collection exists.
    ///
    /// Calling this on an already-initialized provider returns the same
    /// status without touching the backend again.
    async fn initialize(&self) -> Result<ProviderStatus>;

    /// Insert or overwrite a vector.
    async fn upsert_vector(&self, id: &str, vector: &[f32], metadata: &Metadata) -> Result<()>;

    /// Find the stored vectors most similar to `query`.
    async fn query_vectors(
        &self,
        query: &[f32],
        options: &QueryOptions,
    ) -> Result<Vec<ScoredRecord>>;

    /// Delete a single vector. Returns whether it existed.
    async fn delete_vector(&self, id: &str) -> Result<bool>;

    /// Delete every vector whose id starts with `prefix`. Returns the count.
    async fn delete_namespace(&self, prefix: &str) -> Result<usize>;

    /// List every vector whose id starts with `prefix`.
    async fn list_vectors(&self, prefix: &str) -> Result<Vec<VectorRecord>>;

    /// Liveness check; must not read or write data.
    async fn ping(&self) -> Result<()>;

    /// Release backend resources.
    async fn close(&self) -> Result<()>;

    /// Drop and recreate the provider's collection(s).
    ///
    /// Used by corruption recovery. Leaves the provider initialized and empty.
    async fn reset(&self) -> Result<()>;

    /// Provider name for diagnostics.
    fn name(&self) -> &str;

    /// Which adapter this is.
    fn kind(&self) -> ProviderKind;
}

/// True when every predicate in `filter` matches `metadata` exactly.
pub fn matches_filter(metadata: &Metadata, filter: &Metadata) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

/// Over-fetch factor when part of a filter is checked after the search.
const RESIDUAL_OVERFETCH: usize = 4;

/// How many hits to ask a backend for when `residual` predicates are
/// filtered client-side.
pub fn fetch_limit(limit: usize, residual: bool) -> usize {
    if residual {
        limit.saturating_mul(RESIDUAL_OVERFETCH)
    } else {
        limit
    }
}

/// Apply the query contract: threshold, descending sort, limit.
pub fn finalize_results(mut results: Vec<ScoredRecord>, options: &QueryOptions) -> Vec<ScoredRecord> {
    results.retain(|r| r.similarity >= options.threshold);
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    results.truncate(options.limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scored(id: &str, similarity: f32) -> ScoredRecord {
        ScoredRecord {
            record: VectorRecord::new(id, vec![1.0], Metadata::new()),
            similarity,
            distance: 1.0 - similarity,
        }
    }

    #[test]
    fn test_matches_filter() {
        let mut metadata = Metadata::new();
        metadata.insert("project_id".into(), json!("alpha"));
        metadata.insert("depth".into(), json!(2));

        let mut filter = Metadata::new();
        assert!(matches_filter(&metadata, &filter));

        filter.insert("project_id".into(), json!("alpha"));
        assert!(matches_filter(&metadata, &filter));

        filter.insert("depth".into(), json!(2));
        assert!(matches_filter(&metadata, &filter));

        filter.insert("depth".into(), json!(3));
        assert!(!matches_filter(&metadata, &filter));

        let mut missing = Metadata::new();
        missing.insert("absent".into(), json!(true));
        assert!(!matches_filter(&metadata, &missing));
    }

    #[test]
    fn test_finalize_results_threshold_sort_limit() {
        let results = vec![
            scored("a", 0.2),
            scored("b", 0.9),
            scored("c", 0.5),
            scored("d", 0.7),
        ];
        let options = QueryOptions::new(2).with_threshold(0.4);
        let out = finalize_results(results, &options);

        let ids: Vec<_> = out.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }

    #[test]
    fn test_finalize_results_ties_are_stable_by_id() {
        let out = finalize_results(
            vec![scored("z", 0.5), scored("a", 0.5)],
            &QueryOptions::new(10),
        );
        assert_eq!(out[0].id(), "a");
    }

    #[test]
    fn test_fetch_limit() {
        assert_eq!(fetch_limit(5, false), 5);
        assert_eq!(fetch_limit(5, true), 20);
        assert_eq!(fetch_limit(usize::MAX, true), usize::MAX);
    }

    #[test]
    fn test_trait_object_safety() {
        fn _assert_object_safe(_: &dyn VectorProvider) {}
    }
}
