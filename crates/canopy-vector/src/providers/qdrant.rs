//! Qdrant vector provider (REST).
//!
//! Talks to a Qdrant server over its HTTP API with `reqwest`.
//!
//! # Ids
//!
//! Qdrant point ids must be unsigned integers or UUIDs, so string ids are
//! mapped to deterministic UUIDv5 values. The original id travels in the
//! payload under `_canopy_id` and is restored on the way out.
//!
//! # Collections
//!
//! The configured collection holds vectors of the declared dimension. Vectors
//! of any other length go to a sibling collection `{collection}_d{dim}`,
//! created on first write and discovered again on initialization. Prefix
//! operations scroll every partition and filter ids client-side.

use async_trait::async_trait;
use canopy_core::{Error, Result};
use reqwest::Method;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::normalize::{clamp_similarity, coerce_embedding, prepare_vector};
use crate::provider::{VectorProvider, fetch_limit, finalize_results, matches_filter};
use crate::types::{
    Metadata, ProviderConfig, ProviderKind, ProviderMode, ProviderStatus, QueryOptions,
    ScoredRecord, VectorRecord,
};

/// Payload key carrying the caller's string id.
pub const ID_PAYLOAD_KEY: &str = "_canopy_id";

/// Page size for scroll requests.
const SCROLL_PAGE: usize = 256;

#[derive(Debug, Default)]
struct QdrantState {
    initialized: bool,
    closed: bool,
    /// Known collections by vector dimension.
    partitions: BTreeMap<usize, String>,
}

/// Qdrant-backed vector provider.
pub struct QdrantProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    dimension: usize,
    state: RwLock<QdrantState>,
}

impl QdrantProvider {
    /// Create a provider from its configuration block.
    ///
    /// No request is made until [`VectorProvider::initialize`].
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = config
            .url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::provider_init("qdrant", "no server URL configured"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::provider_init("qdrant", format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            collection: config.collection.clone(),
            dimension: config.dimension,
            state: RwLock::new(QdrantState::default()),
        })
    }

    /// Deterministic point id for a string id.
    pub fn point_id(id: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes())
    }

    /// Collection name used for vectors of `dimension`.
    pub fn collection_name(&self, dimension: usize) -> String {
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
            mode: ProviderMode::Server,
            collection_id: self.collection.clone(),
        }
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::query(format!("Qdrant request {method} {path} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::query(format!(
                "Qdrant {method} {path} failed with status code {}: {text}",
                status.as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::query(format!("Failed to parse Qdrant response: {e}")))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        self.send(
            Method::PUT,
            &format!("/collections/{name}"),
            Some(json!({ "vectors": { "size": dimension, "distance": "Cosine" } })),
        )
        .await?;
        log::info!("Created Qdrant collection '{name}' (dimension {dimension})");
        Ok(())
    }

    /// Resolve the collection for a dimension, creating it when `create`.
    async fn partition(&self, dimension: usize, create: bool) -> Result<Option<String>> {
        if let Some(name) = self.state.read().await.partitions.get(&dimension) {
            return Ok(Some(name.clone()));
        }
        if !create {
            return Ok(None);
        }

        let mut state = self.state.write().await;
        if let Some(name) = state.partitions.get(&dimension) {
            return Ok(Some(name.clone()));
        }
        let name = self.collection_name(dimension);
        self.create_collection(&name, dimension).await?;
        state.partitions.insert(dimension, name.clone());
        Ok(Some(name))
    }

    async fn ensure_open(&self) -> Result<()> {
        let state = self.state.read().await;
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

    async fn partitions(&self) -> Vec<String> {
        self.state.read().await.partitions.values().cloned().collect()
    }

    /// Page through every point of a collection.
    async fn scroll(&self, collection: &str, with_vector: bool) -> Result<Vec<Value>> {
        let mut points = Vec::new();
        let mut offset = Value::Null;
        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE,
                "with_payload": true,
                "with_vector": with_vector,
            });
            if !offset.is_null() {
                body["offset"] = offset.clone();
            }
            let response = self
                .send(
                    Method::POST,
                    &format!("/collections/{collection}/points/scroll"),
                    Some(body),
                )
                .await?;

            if let Some(page) = response["result"]["points"].as_array() {
                points.extend(page.iter().cloned());
            }
            offset = response["result"]["next_page_offset"].clone();
            if offset.is_null() {
                return Ok(points);
            }
        }
    }

    async fn drop_partition(&self, dimension: usize, collection: &str) -> Result<()> {
        self.send(Method::DELETE, &format!("/collections/{collection}"), None)
            .await?;
        self.state.write().await.partitions.remove(&dimension);
        log::debug!("Dropped empty Qdrant collection '{collection}'");
        Ok(())
    }

    async fn delete_points(&self, collection: &str, ids: &[Value]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.send(
            Method::POST,
            &format!("/collections/{collection}/points/delete?wait=true"),
            Some(json!({ "points": ids })),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl VectorProvider for QdrantProvider {
    async fn initialize(&self) -> Result<ProviderStatus> {
        {
            let state = self.state.read().await;
            if state.closed {
                return Err(Error::closed(format!("{} provider is closed", self.name())));
            }
            if state.initialized {
                return Ok(self.status());
            }
        }
        if self.dimension == 0 {
            return Err(Error::provider_init(self.name(), "dimension must be > 0"));
        }

        let listing = self
            .send(Method::GET, "/collections", None)
            .await
            .map_err(|e| Error::provider_init(self.name(), e.to_string()))?;

        let mut partitions = BTreeMap::new();
        for entry in listing["result"]["collections"]
            .as_array()
            .into_iter()
            .flatten()
        {
            if let Some(name) = entry["name"].as_str()
                && let Some(dim) = self.partition_dimension(name)
            {
                partitions.insert(dim, name.to_string());
            }
        }

        if !partitions.contains_key(&self.dimension) {
            self.create_collection(&self.collection, self.dimension)
                .await
                .map_err(|e| Error::provider_init(self.name(), e.to_string()))?;
            partitions.insert(self.dimension, self.collection.clone());
        } else {
            log::debug!("Reusing Qdrant collection '{}'", self.collection);
        }

        let mut state = self.state.write().await;
        state.partitions = partitions;
        state.initialized = true;
        log::info!(
            "Qdrant provider ready at {} ({} collection(s))",
            self.base_url,
            state.partitions.len()
        );
        Ok(self.status())
    }

    async fn upsert_vector(&self, id: &str, vector: &[f32], metadata: &Metadata) -> Result<()> {
        let vector = prepare_vector(vector)?;
        self.ensure_open().await?;

        let collection = self
            .partition(vector.len(), true)
            .await?
            .ok_or_else(|| Error::operation("partition creation returned nothing"))?;

        let mut payload = metadata.clone();
        payload.insert(ID_PAYLOAD_KEY.to_string(), Value::from(id));

        self.send(
            Method::PUT,
            &format!("/collections/{collection}/points?wait=true"),
            Some(json!({
                "points": [{
                    "id": Self::point_id(id).to_string(),
                    "vector": vector,
                    "payload": payload,
                }]
            })),
        )
        .await?;
        Ok(())
    }

    async fn query_vectors(
        &self,
        query: &[f32],
        options: &QueryOptions,
    ) -> Result<Vec<ScoredRecord>> {
        let query = prepare_vector(query)?;
        self.ensure_open().await?;

        let Some(collection) = self.partition(query.len(), false).await? else {
            return Ok(Vec::new());
        };

        let (must, residual) = build_filter(&options.filter);
        let fetch = fetch_limit(options.limit, residual);

        let mut body = json!({
            "vector": query,
            "limit": fetch.max(1),
            "with_payload": true,
            "with_vector": true,
        });
        if !must.is_empty() {
            body["filter"] = json!({ "must": must });
        }
        if options.threshold > 0.0 {
            body["score_threshold"] = json!(options.threshold);
        }

        let response = self
            .send(
                Method::POST,
                &format!("/collections/{collection}/points/search"),
                Some(body),
            )
            .await?;

        let mut results = Vec::new();
        for point in response["result"].as_array().into_iter().flatten() {
            let record = parse_point(point)?;
            if !matches_filter(&record.metadata, &options.filter) {
                continue;
            }
            let score = point["score"].as_f64().unwrap_or(0.0) as f32;
            results.push(ScoredRecord {
                record,
                similarity: clamp_similarity(score),
                distance: 1.0 - score,
            });
        }

        Ok(finalize_results(results, options))
    }

    async fn delete_vector(&self, id: &str) -> Result<bool> {
        self.ensure_open().await?;
        let point = Value::from(Self::point_id(id).to_string());

        let mut existed = false;
        for collection in self.partitions().await {
            let found = self
                .send(
                    Method::POST,
                    &format!("/collections/{collection}/points"),
                    Some(json!({ "ids": [point.clone()], "with_payload": false })),
                )
                .await?;
            if found["result"].as_array().is_some_and(|a| !a.is_empty()) {
                self.delete_points(&collection, std::slice::from_ref(&point))
                    .await?;
                existed = true;
            }
        }
        Ok(existed)
    }

    async fn delete_namespace(&self, prefix: &str) -> Result<usize> {
        self.ensure_open().await?;

        let mut removed = 0;
        let entries: Vec<(usize, String)> = self
            .state
            .read()
            .await
            .partitions
            .iter()
            .map(|(dim, name)| (*dim, name.clone()))
            .collect();
        for (dimension, collection) in entries {
            let points = self.scroll(&collection, false).await?;
            let total = points.len();
            let ids: Vec<Value> = points
                .into_iter()
                .filter(|p| {
                    p["payload"][ID_PAYLOAD_KEY]
                        .as_str()
                        .is_some_and(|id| id.starts_with(prefix))
                })
                .map(|p| p["id"].clone())
                .collect();
            self.delete_points(&collection, &ids).await?;
            removed += ids.len();

            // Sibling collections exist only while they hold points.
            if dimension != self.dimension && !ids.is_empty() && ids.len() == total {
                self.drop_partition(dimension, &collection).await?;
            }
        }
        if removed > 0 {
            log::debug!("Deleted {removed} Qdrant points under '{prefix}'");
        }
        Ok(removed)
    }

    async fn list_vectors(&self, prefix: &str) -> Result<Vec<VectorRecord>> {
        self.ensure_open().await?;

        let mut records = Vec::new();
        for collection in self.partitions().await {
            for point in self.scroll(&collection, true).await? {
                let matches = point["payload"][ID_PAYLOAD_KEY]
                    .as_str()
                    .is_some_and(|id| id.starts_with(prefix));
                if matches {
                    records.push(parse_point(&point)?);
                }
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn ping(&self) -> Result<()> {
        if self.state.read().await.closed {
            return Err(Error::closed(format!("{} provider is closed", self.name())));
        }
        self.send(Method::GET, "/healthz", None)
            .await
            .or_else(|e| match e {
                // /healthz answers plain text, which is still a live server.
                Error::Query(msg) if msg.starts_with("Failed to parse") => Ok(Value::Null),
                other => Err(other),
            })?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.closed {
            state.closed = true;
            state.partitions.clear();
            log::debug!("Qdrant provider closed");
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        if self.state.read().await.closed {
            return Err(Error::closed(format!("{} provider is closed", self.name())));
        }

        for collection in self.partitions().await {
            self.send(Method::DELETE, &format!("/collections/{collection}"), None)
                .await?;
        }
        self.create_collection(&self.collection, self.dimension).await?;

        let mut state = self.state.write().await;
        state.partitions = BTreeMap::from([(self.dimension, self.collection.clone())]);
        state.initialized = true;
        log::info!("Qdrant collection '{}' reset", self.collection);
        Ok(())
    }

    fn name(&self) -> &str {
        "qdrant"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Qdrant
    }
}

impl std::fmt::Debug for QdrantProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantProvider")
            .field("url", &self.base_url)
            .field("collection", &self.collection)
            .field("dimension", &self.dimension)
            .finish()
    }
}

// ============================================================================
// Request and response mapping
// ============================================================================

/// Translate exact-match predicates into Qdrant `must` conditions.
///
/// Qdrant matches keywords, integers and booleans natively. Any other value
/// is left to the client-side check; the second element reports whether
/// such a residual predicate exists.
fn build_filter(filter: &Metadata) -> (Vec<Value>, bool) {
    let mut must = Vec::new();
    let mut residual = false;
    for (key, value) in filter {
        let native = match value {
            Value::String(_) | Value::Bool(_) => true,
            Value::Number(n) => n.is_i64() || n.is_u64(),
            _ => false,
        };
        if native {
            must.push(json!({ "key": key, "match": { "value": value } }));
        } else {
            residual = true;
        }
    }
    (must, residual)
}

/// Convert a Qdrant point (search hit or scroll entry) into a record.
///
/// A vector that cannot be decoded means the collection holds data we did not
/// write, which is reported as corruption.
fn parse_point(point: &Value) -> Result<VectorRecord> {
    let mut metadata: Metadata = point["payload"].as_object().cloned().unwrap_or_default();
    let id = match metadata.remove(ID_PAYLOAD_KEY) {
        Some(Value::String(id)) => id,
        _ => point["id"].to_string().trim_matches('"').to_string(),
    };

    let vector = match &point["vector"] {
        Value::Null => Vec::new(),
        raw => coerce_embedding(raw).map_err(|e| {
            Error::corruption(format!("malformed array returned for point '{id}': {e}"))
        })?,
    };

    Ok(VectorRecord::new(id, vector, metadata))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> ProviderConfig {
        // Port 1 is never a Qdrant server; connections are refused immediately.
        ProviderConfig::default()
            .with_url("http://127.0.0.1:1")
            .with_collection("hta")
            .with_dimension(4)
    }

    #[test]
    fn test_new_requires_url() {
        let err = QdrantProvider::new(&ProviderConfig::default()).unwrap_err();
        assert!(err.is_provider_init());
    }

    #[test]
    fn test_point_id_is_deterministic() {
        let a = QdrantProvider::point_id("p1:task:1");
        let b = QdrantProvider::point_id("p1:task:1");
        let c = QdrantProvider::point_id("p1:task:2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.get_version_num(), 5);
    }

    #[test]
    fn test_collection_partitioning() {
        let provider = QdrantProvider::new(&unreachable_config()).unwrap();
        assert_eq!(provider.collection_name(4), "hta");
        assert_eq!(provider.collection_name(768), "hta_d768");

        assert_eq!(provider.partition_dimension("hta"), Some(4));
        assert_eq!(provider.partition_dimension("hta_d384"), Some(384));
        assert_eq!(provider.partition_dimension("hta_dx"), None);
        assert_eq!(provider.partition_dimension("other"), None);
    }

    #[test]
    fn test_build_filter() {
        let mut filter = Metadata::new();
        filter.insert("project_id".into(), json!("alpha"));
        filter.insert("depth".into(), json!(2));
        let (must, residual) = build_filter(&filter);
        assert_eq!(must.len(), 2);
        assert!(!residual);

        filter.insert("weight".into(), json!(0.5));
        let (must, residual) = build_filter(&filter);
        assert_eq!(must.len(), 2);
        assert!(residual);
    }

    #[test]
    fn test_parse_point_restores_id() {
        let point = json!({
            "id": "c6c5b4c0-0000-5000-8000-000000000000",
            "score": 0.93,
            "payload": {"_canopy_id": "p1:goal:g1", "project_id": "p1"},
            "vector": [0.1, 0.2]
        });
        let record = parse_point(&point).unwrap();
        assert_eq!(record.id, "p1:goal:g1");
        assert_eq!(record.vector, vec![0.1, 0.2]);
        assert!(!record.metadata.contains_key(ID_PAYLOAD_KEY));
        assert_eq!(record.metadata.get("project_id").unwrap(), "p1");
    }

    #[test]
    fn test_parse_point_malformed_vector_is_corruption() {
        let point = json!({
            "id": 1,
            "payload": {"_canopy_id": "p:k:1"},
            "vector": "garbage"
        });
        let err = parse_point(&point).unwrap_err();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("malformed array"));
    }

    #[tokio::test]
    async fn test_initialize_unreachable_is_provider_init() {
        let provider = QdrantProvider::new(&unreachable_config()).unwrap();
        let err = provider.initialize().await.unwrap_err();
        assert!(err.is_provider_init());
    }

    #[tokio::test]
    async fn test_non_finite_rejected_before_any_io() {
        let provider = QdrantProvider::new(&unreachable_config()).unwrap();

        let err = provider
            .upsert_vector("p:k:1", &[0.1, f32::NAN, 0.0, 0.0], &Metadata::new())
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = provider
            .query_vectors(&[f32::INFINITY; 4], &QueryOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let provider = QdrantProvider::new(&unreachable_config()).unwrap();
        provider.close().await.unwrap();
        provider.close().await.unwrap();
        assert!(matches!(
            provider.initialize().await.unwrap_err(),
            Error::Closed(_)
        ));
    }
}
