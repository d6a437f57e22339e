//! Common types for the vector storage layer.
//!
//! These types are shared by every provider adapter and by the orchestrator,
//! and are always available regardless of feature flags.

use canopy_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Arbitrary JSON metadata attached to a stored vector.
pub type Metadata = serde_json::Map<String, Value>;

// ============================================================================
// Records
// ============================================================================

/// A vector together with its identity and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique record identifier (`{project}:{kind}:{local}`).
    pub id: String,

    /// The embedding vector.
    pub vector: Vec<f32>,

    /// Metadata snapshot stored with the vector.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl VectorRecord {
    /// Create a new record.
    pub fn new(id: impl Into<String>, vector: Vec<f32>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata,
        }
    }

    /// The vector dimension.
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// A query hit: the stored record plus its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// The matched record.
    pub record: VectorRecord,

    /// Similarity in `[0, 1]`, 1.0 meaning identical direction.
    pub similarity: f32,

    /// Raw distance as reported (or computed) by the backend.
    pub distance: f32,
}

impl ScoredRecord {
    /// The matched record's id.
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// The matched record's metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.record.metadata
    }
}

// ============================================================================
// Query options
// ============================================================================

/// Options for [`VectorProvider::query_vectors`](crate::VectorProvider::query_vectors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Maximum results to return.
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Minimum similarity (0.0 to 1.0).
    #[serde(default)]
    pub threshold: f32,

    /// Exact-match metadata predicates, all of which must hold.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub filter: Metadata,
}

fn default_limit() -> usize {
    10
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            threshold: 0.0,
            filter: Metadata::new(),
        }
    }
}

impl QueryOptions {
    /// Create query options with a result limit.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Set the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the similarity threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Add an exact-match metadata predicate.
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Provider identity and status
// ============================================================================

/// The closed set of provider adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Embedded/server document-vector database (LanceDB).
    Lancedb,
    /// Server-based vector database (Qdrant REST).
    Qdrant,
    /// Embedded SQL with a vector extension (SQLite + sqlite-vec).
    Sqlite,
    /// Local JSON files; the universal fallback.
    Flatfile,
}

impl ProviderKind {
    /// All provider kinds.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Lancedb,
        ProviderKind::Qdrant,
        ProviderKind::Sqlite,
        ProviderKind::Flatfile,
    ];

    /// Canonical configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Lancedb => "lancedb",
            ProviderKind::Qdrant => "qdrant",
            ProviderKind::Sqlite => "sqlite",
            ProviderKind::Flatfile => "flatfile",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lancedb" | "lance" | "document" => Ok(ProviderKind::Lancedb),
            "qdrant" => Ok(ProviderKind::Qdrant),
            "sqlite" | "sqlite-vec" => Ok(ProviderKind::Sqlite),
            "flatfile" | "flat-file" | "localjson" | "json" => Ok(ProviderKind::Flatfile),
            other => Err(Error::config(format!(
                "Unknown vector provider: '{other}'. Supported: lancedb, qdrant, sqlite, flatfile"
            ))),
        }
    }
}

/// How a provider reaches its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// In-process database, no external server.
    Embedded,
    /// Remote server reached over the network.
    Server,
    /// Plain files on local disk.
    File,
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderMode::Embedded => "embedded",
            ProviderMode::Server => "server",
            ProviderMode::File => "file",
        };
        f.write_str(s)
    }
}

/// Result of [`VectorProvider::initialize`](crate::VectorProvider::initialize).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
    /// Whether the provider is ready for use.
    pub success: bool,

    /// Provider name for diagnostics.
    pub provider_name: String,

    /// Connection mode.
    pub mode: ProviderMode,

    /// Backend-specific collection identifier.
    pub collection_id: String,
}

// ============================================================================
// Configuration
// ============================================================================

/// Per-backend configuration block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Collection (table) name.
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Server URL. For LanceDB, absence or the `embedded` marker selects
    /// embedded mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Local path for embedded and file-backed providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Declared collection dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// API key for server providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Request timeout for server providers, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_collection() -> String {
    "canopy_vectors".to_string()
}

fn default_dimension() -> usize {
    1536
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            url: None,
            path: None,
            dimension: default_dimension(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    /// Set the URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the local path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the collection name.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Set the declared dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

/// Configuration blocks for every provider kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// LanceDB block.
    #[serde(default)]
    pub lancedb: ProviderConfig,

    /// Qdrant block.
    #[serde(default = "default_qdrant")]
    pub qdrant: ProviderConfig,

    /// SQLite block.
    #[serde(default)]
    pub sqlite: ProviderConfig,

    /// Flat-file block.
    #[serde(default)]
    pub flatfile: ProviderConfig,
}

fn default_qdrant() -> ProviderConfig {
    ProviderConfig::default().with_url("http://localhost:6333")
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            lancedb: ProviderConfig::default(),
            qdrant: default_qdrant(),
            sqlite: ProviderConfig::default(),
            flatfile: ProviderConfig::default(),
        }
    }
}

impl ProvidersConfig {
    /// The configuration block for a provider kind.
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::Lancedb => &self.lancedb,
            ProviderKind::Qdrant => &self.qdrant,
            ProviderKind::Sqlite => &self.sqlite,
            ProviderKind::Flatfile => &self.flatfile,
        }
    }

    fn get_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        match kind {
            ProviderKind::Lancedb => &mut self.lancedb,
            ProviderKind::Qdrant => &mut self.qdrant,
            ProviderKind::Sqlite => &mut self.sqlite,
            ProviderKind::Flatfile => &mut self.flatfile,
        }
    }
}

/// Vector store configuration: provider selection plus per-backend blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Primary provider.
    #[serde(default = "default_primary")]
    pub primary: ProviderKind,

    /// Provider tried when the primary fails.
    #[serde(default = "default_fallback")]
    pub fallback: ProviderKind,

    /// Per-backend blocks.
    #[serde(default)]
    pub providers: ProvidersConfig,
}

fn default_primary() -> ProviderKind {
    ProviderKind::Lancedb
}

fn default_fallback() -> ProviderKind {
    ProviderKind::Flatfile
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            fallback: default_fallback(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl VectorStoreConfig {
    /// Fill in unset local paths relative to `base`.
    ///
    /// LanceDB gets `base/lancedb`, SQLite `base/vectors.db` and the flat-file
    /// provider `base/flatfile`. Explicit paths are left alone.
    pub fn resolve_paths(&mut self, base: &std::path::Path) {
        let defaults: [(ProviderKind, PathBuf); 3] = [
            (ProviderKind::Lancedb, base.join("lancedb")),
            (ProviderKind::Sqlite, base.join("vectors.db")),
            (ProviderKind::Flatfile, base.join("flatfile")),
        ];
        for (kind, path) in defaults {
            let block = self.providers.get_mut(kind);
            if block.path.is_none() {
                block.path = Some(path.to_string_lossy().into_owned());
            }
        }
    }
}

// ============================================================================
// Vector ids
// ============================================================================

/// A namespaced vector id: `{project_id}:{entity_kind}:{local_id}`.
///
/// This format is the wire contract other subsystems rely on when addressing
/// or bulk-deleting a project's vectors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorId {
    project_id: String,
    entity_kind: String,
    local_id: String,
}

impl VectorId {
    /// Build an id, validating each component.
    ///
    /// Project id and entity kind must be non-empty and free of `:`; the
    /// local id must be non-empty and may contain `:`.
    pub fn new(
        project_id: impl Into<String>,
        entity_kind: impl Into<String>,
        local_id: impl Into<String>,
    ) -> Result<Self> {
        let project_id = project_id.into();
        let entity_kind = entity_kind.into();
        let local_id = local_id.into();

        validate_segment("project id", &project_id)?;
        validate_segment("entity kind", &entity_kind)?;
        if local_id.is_empty() {
            return Err(Error::validation("local id must not be empty"));
        }

        Ok(Self {
            project_id,
            entity_kind,
            local_id,
        })
    }

    /// Parse an id string.
    pub fn parse(id: &str) -> Result<Self> {
        let mut parts = id.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(project), Some(kind), Some(local)) => Self::new(project, kind, local),
            _ => Err(Error::validation(format!(
                "vector id '{id}' is not of the form project:kind:local"
            ))),
        }
    }

    /// The project component.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The entity kind component.
    pub fn entity_kind(&self) -> &str {
        &self.entity_kind
    }

    /// The local id component.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// The `{project}:{kind}:` namespace this id belongs to.
    pub fn namespace(&self) -> String {
        namespace_prefix(&self.project_id, Some(&self.entity_kind))
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.project_id, self.entity_kind, self.local_id)
    }
}

/// Namespace prefix for a project, optionally narrowed to one entity kind.
///
/// `namespace_prefix("p1", Some("task"))` is `"p1:task:"`;
/// `namespace_prefix("p1", None)` is `"p1:"`.
pub fn namespace_prefix(project_id: &str, entity_kind: Option<&str>) -> String {
    match entity_kind {
        Some(kind) => format!("{project_id}:{kind}:"),
        None => format!("{project_id}:"),
    }
}

fn validate_segment(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::validation(format!("{what} must not be empty")));
    }
    if value.contains(':') {
        return Err(Error::validation(format!(
            "{what} '{value}' must not contain ':'"
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_id_roundtrip_format() {
        let id = VectorId::new("proj1", "task", "task_42").unwrap();
        assert_eq!(id.to_string(), "proj1:task:task_42");
        assert_eq!(id.namespace(), "proj1:task:");

        let parsed = VectorId::parse("proj1:task:task_42").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_vector_id_local_may_contain_colon() {
        let parsed = VectorId::parse("p:learning:2025-01-01T10:00").unwrap();
        assert_eq!(parsed.local_id(), "2025-01-01T10:00");
    }

    #[test]
    fn test_vector_id_rejects_bad_segments() {
        assert!(VectorId::new("", "task", "a").unwrap_err().is_validation());
        assert!(VectorId::new("a:b", "task", "a").unwrap_err().is_validation());
        assert!(VectorId::new("p", "ta:sk", "a").unwrap_err().is_validation());
        assert!(VectorId::new("p", "task", "").unwrap_err().is_validation());
        assert!(VectorId::parse("only:two").is_err());
    }

    #[test]
    fn test_namespace_prefix() {
        assert_eq!(namespace_prefix("alpha", Some("goal")), "alpha:goal:");
        assert_eq!(namespace_prefix("alpha", None), "alpha:");
    }

    #[test]
    fn test_query_options_builder() {
        let opts = QueryOptions::new(5)
            .with_threshold(0.4)
            .with_filter("project_id", "alpha")
            .with_filter("depth", 2);
        assert_eq!(opts.limit, 5);
        assert_eq!(opts.threshold, 0.4);
        assert_eq!(opts.filter.get("project_id").unwrap(), "alpha");
        assert_eq!(opts.filter.get("depth").unwrap(), 2);
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("LanceDB".parse::<ProviderKind>().unwrap(), ProviderKind::Lancedb);
        assert_eq!("flat-file".parse::<ProviderKind>().unwrap(), ProviderKind::Flatfile);
        assert_eq!("sqlite".parse::<ProviderKind>().unwrap(), ProviderKind::Sqlite);
        assert!("chroma-ish".parse::<ProviderKind>().is_err());
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_store_config_defaults() {
        let config = VectorStoreConfig::default();
        assert_eq!(config.primary, ProviderKind::Lancedb);
        assert_eq!(config.fallback, ProviderKind::Flatfile);
        assert_eq!(config.providers.lancedb.dimension, 1536);
        assert_eq!(
            config.providers.qdrant.url.as_deref(),
            Some("http://localhost:6333")
        );
    }

    #[test]
    fn test_store_config_deserialization_with_defaults() {
        let json = r#"{"primary": "qdrant", "providers": {"qdrant": {"collection": "hta"}}}"#;
        let config: VectorStoreConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.primary, ProviderKind::Qdrant);
        assert_eq!(config.fallback, ProviderKind::Flatfile);
        assert_eq!(config.providers.qdrant.collection, "hta");
        assert_eq!(config.providers.qdrant.dimension, 1536);
        // A block that is present but omits the url does not inherit the default.
        assert!(config.providers.qdrant.url.is_none());
    }

    #[test]
    fn test_resolve_paths() {
        let mut config = VectorStoreConfig::default();
        config.providers.sqlite.path = Some("/explicit/db.sqlite".into());
        config.resolve_paths(std::path::Path::new("/data/vectors"));

        assert_eq!(
            config.providers.lancedb.path.as_deref(),
            Some("/data/vectors/lancedb")
        );
        assert_eq!(
            config.providers.sqlite.path.as_deref(),
            Some("/explicit/db.sqlite")
        );
        assert_eq!(
            config.providers.flatfile.path.as_deref(),
            Some("/data/vectors/flatfile")
        );
        assert!(config.providers.qdrant.path.is_none());
    }

    #[test]
    fn test_record_serialization_skips_empty_metadata() {
        let record = VectorRecord::new("p:task:1", vec![0.1, 0.2], Metadata::new());
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("metadata"));
        assert_eq!(record.dimension(), 2);
    }
}
