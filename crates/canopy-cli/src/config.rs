//! Configuration for the Canopy CLI.
//!
//! Provides the [`CanopyConfig`] struct that loads from TOML files,
//! environment variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `--config <path>` flag
//! 2. `CANOPY_CONFIG` environment variable
//! 3. XDG default: `~/.config/canopy/config.toml`
//! 4. Built-in defaults
//!
//! `CANOPY_*` environment variables override file values
//! (e.g. `CANOPY_DATA_DIR`, `CANOPY_VECTOR_PRIMARY`).

use canopy_core::traits::ConfigProvider;
use canopy_core::{Error, Result};
use canopy_semantic::{ContentConfig, SemanticConfig};
use canopy_vector::{CacheConfig, CorruptionConfig, VectorStoreConfig};
use confyg::{Confygery, env};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const CONFIG_ENV: &str = "CANOPY_CONFIG";

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration for the Canopy CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanopyConfig {
    /// Application name, used for default paths.
    pub project_name: String,

    /// Root for sidecar documents and local vector stores.
    pub data_dir: Option<String>,

    /// Provider selection and per-provider blocks.
    pub vector: VectorStoreConfig,

    /// Query cache.
    pub cache: CacheConfig,

    /// Corruption signatures.
    pub corruption: CorruptionConfig,

    /// Content previews stored with vectors.
    pub content: ContentConfig,

    /// Embedding model.
    pub embedding: EmbeddingConfig,
}

/// Embedding model configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// fastembed model name; the hashing embedder is used when unset or
    /// when the binary is built without `vector-fastembed`.
    pub model: Option<String>,

    /// Model download directory.
    pub cache_path: Option<String>,
}

impl Default for CanopyConfig {
    fn default() -> Self {
        Self {
            project_name: "canopy".to_string(),
            data_dir: None,
            vector: VectorStoreConfig::default(),
            cache: CacheConfig::default(),
            corruption: CorruptionConfig::default(),
            content: ContentConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl CanopyConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path)
            && path.exists()
        {
            builder
                .add_file(&path.to_string_lossy())
                .map_err(|e| Error::config(format!("config file: {e}")))?;
        }

        let mut env_opts = env::Options::with_top_level("CANOPY");
        for section in ["vector", "cache", "corruption", "content", "embedding"] {
            env_opts.add_section(section);
        }
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        let config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        Ok(config)
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("canopy").join("config.toml"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// The vectorization settings carried by this config.
    pub fn semantic_config(&self) -> SemanticConfig {
        SemanticConfig {
            vector: self.vector.clone(),
            cache: self.cache.clone(),
            corruption: self.corruption.clone(),
            content: self.content.clone(),
        }
    }
}

// ============================================================================
// ConfigProvider implementation
// ============================================================================

impl ConfigProvider for CanopyConfig {
    fn project_name(&self) -> &str {
        &self.project_name
    }

    fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(PathBuf::from(dir));
        }
        dirs::data_dir()
            .map(|d| d.join(&self.project_name))
            .ok_or_else(|| Error::config("Could not determine a data directory; set data_dir"))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_vector::ProviderKind;

    #[test]
    fn test_canopy_config_default() {
        let config = CanopyConfig::default();
        assert_eq!(config.project_name, "canopy");
        assert!(config.data_dir.is_none());
        assert_eq!(config.cache.max_entries, 500);
        assert_eq!(config.vector.fallback, ProviderKind::Flatfile);
        assert!(config.embedding.model.is_none());
    }

    #[test]
    fn test_canopy_config_from_toml() {
        let toml_str = r#"
            data_dir = "/srv/canopy"

            [vector]
            primary = "qdrant"
            fallback = "sqlite"

            [vector.providers.qdrant]
            url = "http://localhost:6333"
            collection = "forest"

            [cache]
            max_entries = 50

            [corruption]
            signatures = ["segment lost"]
        "#;

        let config: CanopyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.data_dir.as_deref(), Some("/srv/canopy"));
        assert_eq!(config.vector.primary, ProviderKind::Qdrant);
        assert_eq!(config.vector.fallback, ProviderKind::Sqlite);
        assert_eq!(
            config.vector.providers.qdrant.url.as_deref(),
            Some("http://localhost:6333")
        );
        assert_eq!(config.vector.providers.qdrant.collection, "forest");
        assert_eq!(config.cache.max_entries, 50);
        assert_eq!(config.corruption.signatures, vec!["segment lost"]);
        assert_eq!(config.content.preview_chars, 512);
    }

    #[test]
    fn test_canopy_config_toml_round_trip() {
        let config = CanopyConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("project_name = \"canopy\""));
        assert!(toml_str.contains("[vector]"));

        let parsed: CanopyConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.vector, config.vector);
        assert_eq!(parsed.corruption, config.corruption);
    }

    #[test]
    fn test_canopy_config_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
                data_dir = "/tmp/canopy-data"
                [vector]
                primary = "flatfile"
            "#,
        )
        .unwrap();

        let config = CanopyConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.data_dir.as_deref(), Some("/tmp/canopy-data"));
        assert_eq!(config.vector.primary, ProviderKind::Flatfile);
    }

    #[test]
    fn test_canopy_config_load_missing_file_uses_defaults() {
        let config = CanopyConfig::load(Some("/nonexistent/canopy.toml")).unwrap();
        assert_eq!(config.project_name, "canopy");
        assert_eq!(config.cache.max_entries, 500);
    }

    #[test]
    fn test_resolve_config_path_explicit() {
        let path = CanopyConfig::resolve_config_path(Some("/explicit/config.toml"));
        assert_eq!(path, Some(PathBuf::from("/explicit/config.toml")));
    }

    #[test]
    fn test_data_dirs_follow_data_dir() {
        let config = CanopyConfig {
            data_dir: Some("/data".into()),
            ..Default::default()
        };
        assert_eq!(config.sidecar_dir().unwrap(), PathBuf::from("/data/sidecar"));
        assert_eq!(config.vector_dir().unwrap(), PathBuf::from("/data/vectors"));
    }

    #[test]
    fn test_semantic_config_carries_sections() {
        let mut config = CanopyConfig::default();
        config.cache.max_entries = 7;
        assert_eq!(config.semantic_config().cache.max_entries, 7);
    }
}
