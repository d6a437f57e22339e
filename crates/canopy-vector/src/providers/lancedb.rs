//! LanceDB vector provider.
//!
//! Stores vectors in LanceDB tables built on Apache Arrow and the Lance
//! format, either embedded in a local directory or through a remote URI.
//!
//! # Mode
//!
//! No URL, or a URL containing the `embedded` marker, opens the local
//! directory from `path`. Any other URL is used as the connection URI.
//!
//! # Schema
//!
//! | Column | Type | Purpose |
//! |--------|------|---------|
//! | `id` | Utf8 | Namespaced vector id |
//! | `metadata` | Utf8 | JSON-serialized metadata |
//! | `vector` | FixedSizeList<Float32> | Embedding vector |
//!
//! A table has one fixed vector width. The configured collection holds the
//! declared dimension; other lengths go to `{collection}_d{dim}`.
//!
//! # Feature Gate
//!
//! This module requires the `vector-lancedb` feature.

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use canopy_core::{Error, Result};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::normalize::{prepare_vector, similarity_from_cosine_distance};
use crate::provider::{VectorProvider, fetch_limit, finalize_results, matches_filter};
use crate::types::{
    Metadata, ProviderConfig, ProviderKind, ProviderMode, ProviderStatus, QueryOptions,
    ScoredRecord, VectorRecord,
};

/// URL marker selecting embedded mode.
pub const EMBEDDED_MARKER: &str = "embedded";

/// Default directory for embedded mode when `path` is unset.
const DEFAULT_DIR: &str = ".canopy/lancedb";

/// Ids per `IN (...)` clause when deleting.
const DELETE_BATCH: usize = 200;

#[derive(Default)]
struct LanceState {
    connection: Option<lancedb::Connection>,
    closed: bool,
    partitions: BTreeMap<usize, String>,
}

/// LanceDB-backed vector provider.
pub struct LancedbProvider {
    uri: String,
    mode: ProviderMode,
    collection: String,
    dimension: usize,
    state: RwLock<LanceState>,
}

impl LancedbProvider {
    /// Create a provider from its configuration block.
    pub fn new(config: &ProviderConfig) -> Self {
        let (mode, uri) = resolve_mode(config);
        Self {
            uri,
            mode,
            collection: config.collection.clone(),
            dimension: config.dimension,
            state: RwLock::new(LanceState::default()),
        }
    }

    /// Connection mode chosen from the configuration.
    pub fn mode(&self) -> ProviderMode {
        self.mode
    }

    /// Table used for vectors of `dimension`.
    pub fn table_name(&self, dimension: usize) -> String {
        if dimension == self.dimension {
            self.collection.clone()
        } else {
            format!("{}_d{dimension}", self.collection)
        }
    }

    fn partition_dimension(&self, name: &str) -> Option<usize> {
        if name == self.collection {
            return Some(self.dimension);
        }
        name.strip_prefix(&self.collection)?
            .strip_prefix("_d")?
            .parse()
            .ok()
    }

    fn status(&self) -> ProviderStatus {
        ProviderStatus {
            success: true,
            provider_name: self.name().to_string(),
            mode: self.mode,
            collection_id: self.collection.clone(),
        }
    }

    async fn connection(&self) -> Result<lancedb::Connection> {
        let state = self.state.read().await;
        if state.closed {
            return Err(Error::closed(format!("{} provider is closed", self.name())));
        }
        state
            .connection
            .clone()
            .ok_or_else(|| Error::query(format!("{} provider is not initialized", self.name())))
    }

    async fn create_table(
        connection: &lancedb::Connection,
        name: &str,
        dimension: usize,
        overwrite: bool,
    ) -> Result<()> {
        let mut builder = connection.create_empty_table(name, make_schema(dimension as i32));
        if overwrite {
            builder = builder.mode(lancedb::database::CreateTableMode::Overwrite);
        }
        builder
            .execute()
            .await
            .map_err(|e| Error::query(format!("Failed to create LanceDB table '{name}': {e}")))?;
        log::info!("Created LanceDB table '{name}' (dimension {dimension})");
        Ok(())
    }

    async fn open_table(&self, name: &str) -> Result<lancedb::Table> {
        self.connection()
            .await?
            .open_table(name)
            .execute()
            .await
            .map_err(|e| Error::query(format!("Failed to open table '{name}': {e}")))
    }

    /// Resolve the table for a dimension, creating it when `create`.
    async fn partition(&self, dimension: usize, create: bool) -> Result<Option<String>> {
        if let Some(name) = self.state.read().await.partitions.get(&dimension) {
            return Ok(Some(name.clone()));
        }
        if !create {
            return Ok(None);
        }

        let connection = self.connection().await?;
        let mut state = self.state.write().await;
        if let Some(name) = state.partitions.get(&dimension) {
            return Ok(Some(name.clone()));
        }
        let name = self.table_name(dimension);
        Self::create_table(&connection, &name, dimension, false).await?;
        state.partitions.insert(dimension, name.clone());
        Ok(Some(name))
    }

    async fn drop_partition(&self, dimension: usize, name: &str) -> Result<()> {
        let connection = self.connection().await?;
        connection
            .drop_table(name, &[])
            .await
            .map_err(|e| Error::query(format!("Failed to drop LanceDB table '{name}': {e}")))?;
        self.state.write().await.partitions.remove(&dimension);
        log::debug!("Dropped empty LanceDB table '{name}'");
        Ok(())
    }

    async fn partitions(&self) -> Vec<String> {
        self.state.read().await.partitions.values().cloned().collect()
    }

    /// Every record of one table whose id starts with `prefix`.
    async fn scan_prefix(&self, table: &str, prefix: &str) -> Result<Vec<VectorRecord>> {
        let table = self.open_table(table).await?;
        let stream = table
            .query()
            .only_if(prefix_filter(prefix))
            .execute()
            .await
            .map_err(|e| Error::query(format!("LanceDB scan failed: {e}")))?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| Error::query(format!("Failed to collect results: {e}")))?;

        let mut records = Vec::new();
        for batch in &batches {
            for (record, _) in parse_batch(batch)? {
                // LIKE treats `_` as a wildcard; keep exact prefixes only.
                if record.id.starts_with(prefix) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }
}

/// Pick embedded or server mode from the configuration.
fn resolve_mode(config: &ProviderConfig) -> (ProviderMode, String) {
    match config.url.as_deref() {
        Some(url) if !url.is_empty() && !url.contains(EMBEDDED_MARKER) => {
            (ProviderMode::Server, url.to_string())
        }
        _ => (
            ProviderMode::Embedded,
            config
                .path
                .clone()
                .unwrap_or_else(|| DEFAULT_DIR.to_string()),
        ),
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn prefix_filter(prefix: &str) -> String {
    format!("id LIKE {}", quote(&format!("{}%", prefix.replace('%', ""))))
}

#[async_trait]
impl VectorProvider for LancedbProvider {
    async fn initialize(&self) -> Result<ProviderStatus> {
        {
            let state = self.state.read().await;
            if state.closed {
                return Err(Error::closed(format!("{} provider is closed", self.name())));
            }
            if state.connection.is_some() {
                return Ok(self.status());
            }
        }
        if self.dimension == 0 {
            return Err(Error::provider_init(self.name(), "dimension must be > 0"));
        }

        if self.mode == ProviderMode::Embedded {
            tokio::fs::create_dir_all(&self.uri)
                .await
                .map_err(|e| Error::provider_init(self.name(), format!("{}: {e}", self.uri)))?;
        }

        let connection = lancedb::connect(&self.uri)
            .execute()
            .await
            .map_err(|e| {
                Error::provider_init(self.name(), format!("Failed to connect to LanceDB: {e}"))
            })?;

        let names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| Error::provider_init(self.name(), format!("Failed to list tables: {e}")))?;

        let mut partitions = BTreeMap::new();
        for name in names {
            if let Some(dim) = self.partition_dimension(&name) {
                partitions.insert(dim, name);
            }
        }

        if partitions.contains_key(&self.dimension) {
            log::debug!("Reusing LanceDB table '{}'", self.collection);
        } else {
            Self::create_table(&connection, &self.collection, self.dimension, false)
                .await
                .map_err(|e| Error::provider_init(self.name(), e.to_string()))?;
            partitions.insert(self.dimension, self.collection.clone());
        }

        let mut state = self.state.write().await;
        state.connection = Some(connection);
        state.partitions = partitions;
        log::info!("LanceDB provider ready ({} mode, {})", self.mode, self.uri);
        Ok(self.status())
    }

    async fn upsert_vector(&self, id: &str, vector: &[f32], metadata: &Metadata) -> Result<()> {
        let vector = prepare_vector(vector)?;
        self.connection().await?;

        let name = self
            .partition(vector.len(), true)
            .await?
            .ok_or_else(|| Error::operation("partition creation returned nothing"))?;
        let table = self.open_table(&name).await?;

        table
            .delete(&format!("id = {}", quote(id)))
            .await
            .map_err(|e| Error::query(format!("LanceDB delete failed: {e}")))?;

        let record = VectorRecord::new(id, vector, metadata.clone());
        let batch = build_record_batch(std::slice::from_ref(&record), record.dimension() as i32)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| Error::query(format!("LanceDB add failed: {e}")))?;
        Ok(())
    }

    async fn query_vectors(
        &self,
        query: &[f32],
        options: &QueryOptions,
    ) -> Result<Vec<ScoredRecord>> {
        let query = prepare_vector(query)?;
        self.connection().await?;

        let Some(name) = self.partition(query.len(), false).await? else {
            return Ok(Vec::new());
        };
        let table = self.open_table(&name).await?;

        let mut residual = false;
        let mut clauses = Vec::new();
        for (key, value) in &options.filter {
            match value.as_str() {
                Some(s) => clauses.push(format!(
                    "json_extract(metadata, '$.{}') = {}",
                    key.replace('\'', "''"),
                    quote(s)
                )),
                None => residual = true,
            }
        }
        let fetch = fetch_limit(options.limit, residual);

        let mut search = table
            .vector_search(query)
            .map_err(|e| Error::query(format!("Failed to create vector search: {e}")))?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(fetch.max(1));
        if !clauses.is_empty() {
            search = search.only_if(clauses.join(" AND "));
        }

        let stream = search
            .execute()
            .await
            .map_err(|e| Error::query(format!("Vector search failed: {e}")))?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| Error::query(format!("Failed to collect results: {e}")))?;

        let mut results = Vec::new();
        for batch in &batches {
            for (record, distance) in parse_batch(batch)? {
                if !matches_filter(&record.metadata, &options.filter) {
                    continue;
                }
                results.push(ScoredRecord {
                    record,
                    similarity: similarity_from_cosine_distance(distance),
                    distance,
                });
            }
        }

        Ok(finalize_results(results, options))
    }

    async fn delete_vector(&self, id: &str) -> Result<bool> {
        self.connection().await?;

        let filter = format!("id = {}", quote(id));
        let mut existed = false;
        for name in self.partitions().await {
            let table = self.open_table(&name).await?;
            let count = table
                .count_rows(Some(filter.clone()))
                .await
                .map_err(|e| Error::query(format!("LanceDB count failed: {e}")))?;
            if count > 0 {
                table
                    .delete(&filter)
                    .await
                    .map_err(|e| Error::query(format!("LanceDB delete failed: {e}")))?;
                existed = true;
            }
        }
        Ok(existed)
    }

    async fn delete_namespace(&self, prefix: &str) -> Result<usize> {
        self.connection().await?;

        let mut removed = 0;
        let entries: Vec<(usize, String)> = self
            .state
            .read()
            .await
            .partitions
            .iter()
            .map(|(dim, name)| (*dim, name.clone()))
            .collect();
        for (dimension, name) in entries {
            let ids: Vec<String> = self
                .scan_prefix(&name, prefix)
                .await?
                .into_iter()
                .map(|r| r.id)
                .collect();
            if ids.is_empty() {
                continue;
            }
            let table = self.open_table(&name).await?;
            for chunk in ids.chunks(DELETE_BATCH) {
                let list: Vec<String> = chunk.iter().map(|id| quote(id)).collect();
                table
                    .delete(&format!("id IN ({})", list.join(", ")))
                    .await
                    .map_err(|e| Error::query(format!("LanceDB delete failed: {e}")))?;
            }
            removed += ids.len();

            // Sibling tables exist only while they hold rows.
            if dimension != self.dimension {
                let left = table
                    .count_rows(None)
                    .await
                    .map_err(|e| Error::query(format!("LanceDB count failed: {e}")))?;
                if left == 0 {
                    self.drop_partition(dimension, &name).await?;
                }
            }
        }
        Ok(removed)
    }

    async fn list_vectors(&self, prefix: &str) -> Result<Vec<VectorRecord>> {
        self.connection().await?;

        let mut records = Vec::new();
        for name in self.partitions().await {
            records.extend(self.scan_prefix(&name, prefix).await?);
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn ping(&self) -> Result<()> {
        self.connection().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.closed {
            state.closed = true;
            state.connection = None;
            state.partitions.clear();
            log::debug!("LanceDB provider closed");
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let connection = self.connection().await?;

        let mut state = self.state.write().await;
        for (dim, name) in &state.partitions {
            Self::create_table(&connection, name, *dim, true).await?;
        }
        if !state.partitions.contains_key(&self.dimension) {
            Self::create_table(&connection, &self.collection, self.dimension, true).await?;
            state
                .partitions
                .insert(self.dimension, self.collection.clone());
        }
        log::info!("LanceDB collection '{}' reset", self.collection);
        Ok(())
    }

    fn name(&self) -> &str {
        "lancedb"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Lancedb
    }
}

impl std::fmt::Debug for LancedbProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LancedbProvider")
            .field("uri", &self.uri)
            .field("mode", &self.mode)
            .field("collection", &self.collection)
            .field("dimension", &self.dimension)
            .finish()
    }
}

// ============================================================================
// Arrow schema and batch construction
// ============================================================================

/// Create the Arrow schema for a vector table.
fn make_schema(dimension: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            ),
            false,
        ),
    ]))
}

/// Build an Arrow RecordBatch from records of one dimension.
fn build_record_batch(records: &[VectorRecord], dimension: i32) -> Result<RecordBatch> {
    let schema = make_schema(dimension);

    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    let metadata_strings = records
        .iter()
        .map(|r| serde_json::to_string(&r.metadata))
        .collect::<std::result::Result<Vec<String>, _>>()?;
    let metadata_refs: Vec<&str> = metadata_strings.iter().map(|s| s.as_str()).collect();

    let all_values: Vec<f32> = records
        .iter()
        .flat_map(|r| r.vector.iter().copied())
        .collect();

    let vector_array = FixedSizeListArray::try_new(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dimension,
        Arc::new(Float32Array::from(all_values)),
        None,
    )
    .map_err(|e| Error::operation(format!("Failed to create vector array: {e}")))?;

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(metadata_refs)),
            Arc::new(vector_array),
        ],
    )
    .map_err(|e| Error::operation(format!("Failed to create RecordBatch: {e}")))
}

/// Decode records (and `_distance`, when present) from a result batch.
fn parse_batch(batch: &RecordBatch) -> Result<Vec<(VectorRecord, f32)>> {
    let id_col = batch
        .column_by_name("id")
        .ok_or_else(|| Error::query("Missing 'id' column in results"))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::query("'id' column is not StringArray"))?;

    let metadata_col = batch
        .column_by_name("metadata")
        .ok_or_else(|| Error::query("Missing 'metadata' column in results"))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::query("'metadata' column is not StringArray"))?;

    let vector_col = batch
        .column_by_name("vector")
        .ok_or_else(|| Error::query("Missing 'vector' column in results"))?
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or_else(|| Error::corruption("malformed array: 'vector' column is not a fixed-size list"))?;

    let distance_col = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut results = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let id = id_col.value(i).to_string();
        let metadata: Metadata = serde_json::from_str(metadata_col.value(i)).unwrap_or_default();

        let values = vector_col.value(i);
        let floats = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| Error::corruption(format!("malformed array stored for '{id}'")))?;
        let vector = floats.values().to_vec();

        let distance = distance_col.map(|c| c.value(i)).unwrap_or(0.0);
        results.push((VectorRecord::new(id, vector, metadata), distance));
    }

    Ok(results)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider_in(dir: &std::path::Path, dimension: usize) -> LancedbProvider {
        LancedbProvider::new(
            &ProviderConfig::default()
                .with_path(dir.join("lancedb").to_string_lossy().into_owned())
                .with_collection("hta")
                .with_dimension(dimension),
        )
    }

    fn meta(project: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("project_id".into(), json!(project));
        m
    }

    #[test]
    fn test_resolve_mode() {
        let (mode, uri) = resolve_mode(&ProviderConfig::default().with_path("/tmp/x"));
        assert_eq!(mode, ProviderMode::Embedded);
        assert_eq!(uri, "/tmp/x");

        let (mode, _) = resolve_mode(
            &ProviderConfig::default()
                .with_url("lancedb://embedded")
                .with_path("/tmp/x"),
        );
        assert_eq!(mode, ProviderMode::Embedded);

        let (mode, uri) = resolve_mode(&ProviderConfig::default().with_url("db://remote-db"));
        assert_eq!(mode, ProviderMode::Server);
        assert_eq!(uri, "db://remote-db");
    }

    #[test]
    fn test_make_schema() {
        let schema = make_schema(384);
        assert_eq!(schema.fields().len(), 3);
        assert_eq!(schema.field(0).name(), "id");
        match schema.field(2).data_type() {
            DataType::FixedSizeList(_, size) => assert_eq!(*size, 384),
            other => panic!("Expected FixedSizeList, got {:?}", other),
        }
    }

    #[test]
    fn test_build_and_parse_batch() {
        let records = vec![
            VectorRecord::new("p:task:1", vec![0.1, 0.2], meta("p")),
            VectorRecord::new("p:task:2", vec![0.3, 0.4], Metadata::new()),
        ];
        let batch = build_record_batch(&records, 2).unwrap();
        assert_eq!(batch.num_rows(), 2);

        let parsed = parse_batch(&batch).unwrap();
        assert_eq!(parsed[0].0, records[0]);
        assert_eq!(parsed[1].0.vector, vec![0.3, 0.4]);
        // No _distance column outside of vector search.
        assert_eq!(parsed[0].1, 0.0);
    }

    #[test]
    fn test_filters_escape_quotes() {
        assert_eq!(quote("it's"), "'it''s'");
        assert_eq!(prefix_filter("p1:task:"), "id LIKE 'p1:task:%'");
    }

    #[tokio::test]
    async fn test_lancedb_upsert_query_delete() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider_in(dir.path(), 4);
        let status = provider.initialize().await.unwrap();
        assert_eq!(status.mode, ProviderMode::Embedded);

        provider
            .upsert_vector("p1:task:a", &[1.0, 0.0, 0.0, 0.0], &meta("p1"))
            .await
            .unwrap();
        provider
            .upsert_vector("p1:task:b", &[0.0, 1.0, 0.0, 0.0], &meta("p1"))
            .await
            .unwrap();
        provider
            .upsert_vector("p2:task:a", &[1.0, 0.0, 0.0, 0.0], &meta("p2"))
            .await
            .unwrap();

        let results = provider
            .query_vectors(&[1.0, 0.0, 0.0, 0.0], &QueryOptions::new(10))
            .await
            .unwrap();
        assert!(results[0].similarity >= 0.99);
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.similarity)));

        assert_eq!(provider.delete_namespace("p1:").await.unwrap(), 2);
        let remaining = provider.list_vectors("").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "p2:task:a");
    }

    #[tokio::test]
    async fn test_lancedb_dimension_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider_in(dir.path(), 4);
        provider.initialize().await.unwrap();

        provider
            .upsert_vector("p:context:1", &[0.5, 0.5], &Metadata::new())
            .await
            .unwrap();
        assert_eq!(
            provider.partitions().await,
            vec!["hta_d2".to_string(), "hta".to_string()]
        );

        // A fresh provider discovers the sibling table.
        let reopened = provider_in(dir.path(), 4);
        reopened.initialize().await.unwrap();
        assert_eq!(reopened.list_vectors("p:").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lancedb_emptied_sibling_table_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider_in(dir.path(), 4);
        provider.initialize().await.unwrap();

        provider
            .upsert_vector("__check__:1", &[0.1; 8], &Metadata::new())
            .await
            .unwrap();
        provider
            .upsert_vector("p:task:1", &[1.0, 0.0, 0.0, 0.0], &Metadata::new())
            .await
            .unwrap();
        assert_eq!(provider.partitions().await.len(), 2);

        assert_eq!(provider.delete_namespace("__check__:").await.unwrap(), 1);
        assert_eq!(provider.partitions().await, vec!["hta".to_string()]);

        let reopened = provider_in(dir.path(), 4);
        reopened.initialize().await.unwrap();
        assert_eq!(reopened.partitions().await, vec!["hta".to_string()]);
        assert_eq!(reopened.list_vectors("").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lancedb_non_finite_rejected_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider_in(dir.path(), 4);
        let err = provider
            .upsert_vector("p:k:1", &[f32::NAN; 4], &Metadata::new())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(!dir.path().join("lancedb").exists());
    }

    #[tokio::test]
    async fn test_lancedb_zero_dimension_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider_in(dir.path(), 0);
        assert!(provider.initialize().await.unwrap_err().is_provider_init());
    }
}
