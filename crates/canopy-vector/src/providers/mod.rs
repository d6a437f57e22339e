//! Provider adapters.
//!
//! | Adapter | Kind | Feature |
//! |---------|------|---------|
//! | [`FlatFileProvider`] | `flatfile` | always |
//! | [`QdrantProvider`] | `qdrant` | always |
//! | `SqliteProvider` | `sqlite` | `vector-sqlite` |
//! | `LancedbProvider` | `lancedb` | `vector-lancedb` |

use canopy_core::{Error, Result};
use std::sync::Arc;

use crate::provider::VectorProvider;
use crate::types::{ProviderConfig, ProviderKind};

pub mod flatfile;
pub mod qdrant;

#[cfg(feature = "vector-lancedb")]
pub mod lancedb;

#[cfg(feature = "vector-sqlite")]
pub mod sqlite;

pub use flatfile::FlatFileProvider;
pub use qdrant::QdrantProvider;

#[cfg(feature = "vector-lancedb")]
pub use self::lancedb::LancedbProvider;

#[cfg(feature = "vector-sqlite")]
pub use sqlite::SqliteProvider;

/// Whether the adapter for `kind` is compiled into this build.
pub fn is_available(kind: ProviderKind) -> bool {
    match kind {
        ProviderKind::Flatfile | ProviderKind::Qdrant => true,
        ProviderKind::Lancedb => cfg!(feature = "vector-lancedb"),
        ProviderKind::Sqlite => cfg!(feature = "vector-sqlite"),
    }
}

/// Construct (but do not initialize) the adapter for `kind`.
///
/// Kinds whose feature is not compiled in fail with `ProviderInit`, which the
/// store treats like any other unavailable backend.
pub fn build_provider(
    kind: ProviderKind,
    config: &ProviderConfig,
) -> Result<Arc<dyn VectorProvider>> {
    match kind {
        ProviderKind::Flatfile => Ok(Arc::new(FlatFileProvider::new(config))),
        ProviderKind::Qdrant => Ok(Arc::new(QdrantProvider::new(config)?)),
        #[cfg(feature = "vector-lancedb")]
        ProviderKind::Lancedb => Ok(Arc::new(LancedbProvider::new(config))),
        #[cfg(feature = "vector-sqlite")]
        ProviderKind::Sqlite => Ok(Arc::new(SqliteProvider::new(config))),
        #[allow(unreachable_patterns)]
        other => Err(Error::provider_init(
            other.as_str(),
            format!("support not compiled in; rebuild with the vector-{other} feature"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_available() {
        assert!(is_available(ProviderKind::Flatfile));
        assert!(is_available(ProviderKind::Qdrant));
    }

    #[test]
    fn test_build_provider_kinds() {
        let provider = build_provider(ProviderKind::Flatfile, &ProviderConfig::default()).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Flatfile);

        let config = ProviderConfig::default().with_url("http://localhost:6333");
        let provider = build_provider(ProviderKind::Qdrant, &config).unwrap();
        assert_eq!(provider.name(), "qdrant");
    }

    #[cfg(not(feature = "vector-sqlite"))]
    #[test]
    fn test_missing_feature_is_provider_init() {
        let err = build_provider(ProviderKind::Sqlite, &ProviderConfig::default()).err();
        assert!(err.is_some_and(|e| e.is_provider_init()));
    }
}
