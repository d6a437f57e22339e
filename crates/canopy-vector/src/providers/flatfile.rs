//! Flat-file vector provider.
//!
//! Stores a collection as one pretty-printed JSON document
//! (`{dir}/{collection}.json`) and answers queries with an in-process cosine
//! scan. It has no external dependency and is the last strategy of every
//! fallback chain, so initialization never fails: an unreadable document is
//! moved aside and an uncreatable directory degrades to in-memory operation.

use async_trait::async_trait;
use canopy_core::util::files::{read_json, write_json_atomic};
use canopy_core::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::normalize::{clamp_similarity, coerce_embedding, cosine_similarity, prepare_vector};
use crate::provider::{VectorProvider, finalize_results, matches_filter};
use crate::types::{
    Metadata, ProviderConfig, ProviderKind, ProviderMode, ProviderStatus, QueryOptions,
    ScoredRecord, VectorRecord,
};

/// Default directory when the configuration leaves `path` unset.
const DEFAULT_DIR: &str = ".canopy/flatfile";

/// On-disk document layout.
#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    collection: String,
    dimension: usize,
    updated_at: String,
    records: Vec<StoredRecord>,
}

/// A record as stored on disk. The vector is kept as raw JSON so documents
/// written by other tools (typed-buffer objects, numeric strings) still load.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    id: String,
    vector: Value,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Default)]
struct FlatFileState {
    initialized: bool,
    closed: bool,
    persist: bool,
    records: BTreeMap<String, VectorRecord>,
}

/// JSON-file-backed vector provider.
#[derive(Debug)]
pub struct FlatFileProvider {
    dir: PathBuf,
    collection: String,
    dimension: usize,
    state: RwLock<FlatFileState>,
}

impl FlatFileProvider {
    /// Create a provider from its configuration block.
    pub fn new(config: &ProviderConfig) -> Self {
        let dir = config
            .path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR));
        Self {
            dir,
            collection: config.collection.clone(),
            dimension: config.dimension,
            state: RwLock::new(FlatFileState::default()),
        }
    }

    /// Create a provider rooted at `dir` with default settings.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(
            &ProviderConfig::default().with_path(dir.as_ref().to_string_lossy().into_owned()),
        )
    }

    /// Path of the collection document.
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.collection))
    }

    fn status(&self) -> ProviderStatus {
        ProviderStatus {
            success: true,
            provider_name: self.name().to_string(),
            mode: ProviderMode::File,
            collection_id: self.file_path().to_string_lossy().into_owned(),
        }
    }

    async fn load_records(&self) -> BTreeMap<String, VectorRecord> {
        let path = self.file_path();
        let file: CollectionFile = match read_json(&path).await {
            Ok(Some(file)) => file,
            Ok(None) => return BTreeMap::new(),
            Err(e) => {
                log::warn!(
                    "Flat-file collection {} unreadable ({e}); starting empty",
                    path.display()
                );
                self.quarantine(&path).await;
                return BTreeMap::new();
            }
        };

        let mut records = BTreeMap::new();
        for stored in file.records {
            match coerce_embedding(&stored.vector) {
                Ok(vector) => {
                    records.insert(
                        stored.id.clone(),
                        VectorRecord::new(stored.id, vector, stored.metadata),
                    );
                }
                Err(e) => log::warn!("Skipping stored vector '{}': {e}", stored.id),
            }
        }
        records
    }

    async fn quarantine(&self, path: &Path) {
        let target = path.with_extension(format!("corrupt.{}", Utc::now().timestamp()));
        if let Err(e) = tokio::fs::rename(path, &target).await {
            log::warn!("Could not move aside {}: {e}", path.display());
        }
    }

    async fn persist(&self, state: &FlatFileState) -> Result<()> {
        if !state.persist {
            return Ok(());
        }
        let file = CollectionFile {
            collection: self.collection.clone(),
            dimension: self.dimension,
            updated_at: Utc::now().to_rfc3339(),
            records: state
                .records
                .values()
                .map(|r| StoredRecord {
                    id: r.id.clone(),
                    vector: Value::from(r.vector.clone()),
                    metadata: r.metadata.clone(),
                })
                .collect(),
        };
        write_json_atomic(&self.file_path(), &file).await
    }

    fn ensure_open(&self, state: &FlatFileState) -> Result<()> {
        if state.closed {
            return Err(Error::closed(format!("{} provider is closed", self.name())));
        }
        if !state.initialized {
            return Err(Error::query(format!(
                "{} provider is not initialized",
                self.name()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorProvider for FlatFileProvider {
    async fn initialize(&self) -> Result<ProviderStatus> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(Error::closed(format!("{} provider is closed", self.name())));
        }
        if state.initialized {
            return Ok(self.status());
        }

        state.persist = match tokio::fs::create_dir_all(&self.dir).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "Flat-file directory {} unavailable ({e}); vectors will not be persisted",
                    self.dir.display()
                );
                false
            }
        };
        if state.persist {
            state.records = self.load_records().await;
        }
        state.initialized = true;

        log::info!(
            "Flat-file provider ready at {} ({} vectors)",
            self.file_path().display(),
            state.records.len()
        );
        Ok(self.status())
    }

    async fn upsert_vector(&self, id: &str, vector: &[f32], metadata: &Metadata) -> Result<()> {
        let vector = prepare_vector(vector)?;

        let mut state = self.state.write().await;
        self.ensure_open(&state)?;
        state
            .records
            .insert(id.to_string(), VectorRecord::new(id, vector, metadata.clone()));
        self.persist(&state).await
    }

    async fn query_vectors(
        &self,
        query: &[f32],
        options: &QueryOptions,
    ) -> Result<Vec<ScoredRecord>> {
        let query = prepare_vector(query)?;

        let state = self.state.read().await;
        self.ensure_open(&state)?;

        let results = state
            .records
            .values()
            .filter(|r| r.vector.len() == query.len())
            .filter(|r| matches_filter(&r.metadata, &options.filter))
            .map(|r| {
                let cosine = cosine_similarity(&query, &r.vector);
                ScoredRecord {
                    record: r.clone(),
                    similarity: clamp_similarity(cosine),
                    distance: 1.0 - cosine,
                }
            })
            .collect();

        Ok(finalize_results(results, options))
    }

    async fn delete_vector(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        self.ensure_open(&state)?;
        let existed = state.records.remove(id).is_some();
        if existed {
            self.persist(&state).await?;
        }
        Ok(existed)
    }

    async fn delete_namespace(&self, prefix: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        self.ensure_open(&state)?;
        let before = state.records.len();
        state.records.retain(|id, _| !id.starts_with(prefix));
        let removed = before - state.records.len();
        if removed > 0 {
            self.persist(&state).await?;
        }
        Ok(removed)
    }

    async fn list_vectors(&self, prefix: &str) -> Result<Vec<VectorRecord>> {
        let state = self.state.read().await;
        self.ensure_open(&state)?;
        Ok(state
            .records
            .range(prefix.to_string()..)
            .take_while(|(id, _)| id.starts_with(prefix))
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        let state = self.state.read().await;
        if state.closed {
            return Err(Error::closed(format!("{} provider is closed", self.name())));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.closed {
            state.closed = true;
            state.records.clear();
            log::debug!("Flat-file provider closed");
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(Error::closed(format!("{} provider is closed", self.name())));
        }
        state.records.clear();
        state.initialized = true;
        self.persist(&state).await?;
        log::info!("Flat-file collection '{}' reset", self.collection);
        Ok(())
    }

    fn name(&self) -> &str {
        "flatfile"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Flatfile
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn meta(project: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("project_id".into(), json!(project));
        m
    }

    async fn ready(dir: &Path) -> FlatFileProvider {
        let provider = FlatFileProvider::in_dir(dir);
        provider.initialize().await.unwrap();
        provider
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let dir = tempdir().unwrap();
        let provider = FlatFileProvider::in_dir(dir.path());
        let first = provider.initialize().await.unwrap();
        let second = provider.initialize().await.unwrap();
        assert_eq!(first, second);
        assert!(first.success);
        assert_eq!(first.mode, ProviderMode::File);
    }

    #[tokio::test]
    async fn test_upsert_and_query_exact_match() {
        let dir = tempdir().unwrap();
        let provider = ready(dir.path()).await;

        provider
            .upsert_vector("p1:task:a", &[1.0, 0.0, 0.0], &meta("p1"))
            .await
            .unwrap();
        provider
            .upsert_vector("p1:task:b", &[0.0, 1.0, 0.0], &meta("p1"))
            .await
            .unwrap();

        let results = provider
            .query_vectors(&[1.0, 0.0, 0.0], &QueryOptions::new(10))
            .await
            .unwrap();
        assert_eq!(results[0].id(), "p1:task:a");
        assert!(results[0].similarity >= 0.99);
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.similarity)));
    }

    #[tokio::test]
    async fn test_upsert_is_last_write_wins() {
        let dir = tempdir().unwrap();
        let provider = ready(dir.path()).await;

        provider
            .upsert_vector("p1:goal:g", &[1.0, 0.0], &meta("p1"))
            .await
            .unwrap();
        provider
            .upsert_vector("p1:goal:g", &[0.0, 1.0], &meta("p1"))
            .await
            .unwrap();

        let listed = provider.list_vectors("p1:").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_query_filter_threshold_and_dimension() {
        let dir = tempdir().unwrap();
        let provider = ready(dir.path()).await;

        provider
            .upsert_vector("p1:task:a", &[1.0, 0.0], &meta("p1"))
            .await
            .unwrap();
        provider
            .upsert_vector("p2:task:a", &[1.0, 0.0], &meta("p2"))
            .await
            .unwrap();
        provider
            .upsert_vector("p1:task:c", &[0.0, 1.0], &meta("p1"))
            .await
            .unwrap();
        provider
            .upsert_vector("p1:context:x", &[1.0, 0.0, 0.0], &meta("p1"))
            .await
            .unwrap();

        let options = QueryOptions::new(10)
            .with_threshold(0.5)
            .with_filter("project_id", "p1");
        let results = provider.query_vectors(&[1.0, 0.0], &options).await.unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["p1:task:a"]);
    }

    #[tokio::test]
    async fn test_delete_namespace_leaves_other_projects() {
        let dir = tempdir().unwrap();
        let provider = ready(dir.path()).await;

        for id in ["p1:task:1", "p1:task:2", "p1:goal:1", "p2:task:1", "p2:task:2"] {
            provider.upsert_vector(id, &[1.0, 0.5], &meta("x")).await.unwrap();
        }

        let removed = provider.delete_namespace("p1:task:").await.unwrap();
        assert_eq!(removed, 2);

        let remaining: Vec<_> = provider
            .list_vectors("")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(remaining, vec!["p1:goal:1", "p2:task:1", "p2:task:2"]);
    }

    #[tokio::test]
    async fn test_delete_vector() {
        let dir = tempdir().unwrap();
        let provider = ready(dir.path()).await;
        provider.upsert_vector("p:k:1", &[1.0], &Metadata::new()).await.unwrap();

        assert!(provider.delete_vector("p:k:1").await.unwrap());
        assert!(!provider.delete_vector("p:k:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let dir = tempdir().unwrap();
        {
            let provider = ready(dir.path()).await;
            provider
                .upsert_vector("p:k:1", &[0.3, 0.4], &meta("p"))
                .await
                .unwrap();
        }
        let reopened = ready(dir.path()).await;
        let listed = reopened.list_vectors("p:").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].metadata.get("project_id").unwrap(), "p");
    }

    #[tokio::test]
    async fn test_loads_typed_buffer_vectors() {
        let dir = tempdir().unwrap();
        let doc = json!({
            "collection": "canopy_vectors",
            "dimension": 2,
            "updated_at": "2025-01-01T00:00:00Z",
            "records": [
                {"id": "p:k:typed", "vector": {"0": 1.0, "1": 0.0}},
                {"id": "p:k:broken", "vector": {"0": "NaN?"}}
            ]
        });
        std::fs::write(
            dir.path().join("canopy_vectors.json"),
            serde_json::to_vec(&doc).unwrap(),
        )
        .unwrap();

        let provider = ready(dir.path()).await;
        let listed = provider.list_vectors("p:").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_quarantined() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("canopy_vectors.json"), "{ not json").unwrap();

        let provider = ready(dir.path()).await;
        assert!(provider.list_vectors("").await.unwrap().is_empty());
        assert!(!dir.path().join("canopy_vectors.json").exists());
    }

    #[tokio::test]
    async fn test_non_finite_rejected_before_any_io() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("never-created");
        // Not initialized and the directory does not exist: validation must
        // still be the first thing that fails, and nothing is written.
        let provider = FlatFileProvider::in_dir(&target);

        let err = provider
            .upsert_vector("p:k:1", &[0.1, f32::NAN], &Metadata::new())
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = provider
            .upsert_vector("p:k:1", &[f32::INFINITY], &Metadata::new())
            .await
            .unwrap_err();
        assert!(err.is_validation());

        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_requires_initialize() {
        let dir = tempdir().unwrap();
        let provider = FlatFileProvider::in_dir(dir.path());
        let err = provider
            .upsert_vector("p:k:1", &[1.0], &Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[tokio::test]
    async fn test_reset_and_close() {
        let dir = tempdir().unwrap();
        let provider = ready(dir.path()).await;
        provider.upsert_vector("p:k:1", &[1.0], &Metadata::new()).await.unwrap();

        provider.reset().await.unwrap();
        assert!(provider.list_vectors("").await.unwrap().is_empty());

        provider.close().await.unwrap();
        provider.close().await.unwrap();
        assert!(provider.ping().await.is_err());
        assert!(matches!(
            provider.list_vectors("").await.unwrap_err(),
            Error::Closed(_)
        ));
    }
}
