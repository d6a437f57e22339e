//! Core traits for Canopy.
//!
//! The primary trait is [`ConfigProvider`], which abstracts where an
//! application keeps its data so that storage components can derive their
//! directories without depending on a concrete configuration type.

use std::path::PathBuf;

use crate::Result;

/// Trait for application-level configuration.
///
/// # Bounds
///
/// - `Send + Sync`: Configuration must be shareable across tasks
/// - `Clone`: Configuration can be duplicated for passing to subsystems
/// - `'static`: Configuration lifetime is not borrowed
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use canopy_core::traits::ConfigProvider;
/// use canopy_core::Result;
///
/// #[derive(Clone)]
/// struct PlannerConfig {
///     data_dir: PathBuf,
/// }
///
/// impl ConfigProvider for PlannerConfig {
///     fn project_name(&self) -> &str {
///         "planner"
///     }
///
///     fn data_dir(&self) -> Result<PathBuf> {
///         Ok(self.data_dir.clone())
///     }
/// }
///
/// let config = PlannerConfig { data_dir: PathBuf::from("/data") };
/// assert_eq!(config.sidecar_dir().unwrap(), PathBuf::from("/data/sidecar"));
/// ```
pub trait ConfigProvider: Send + Sync + Clone + 'static {
    /// The application name, used for log prefixes and default paths.
    fn project_name(&self) -> &str;

    /// Root directory for all persisted data.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be determined.
    fn data_dir(&self) -> Result<PathBuf>;

    /// Directory holding the per-project metadata sidecar documents.
    fn sidecar_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("sidecar"))
    }

    /// Directory used by file-backed vector providers.
    fn vector_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("vectors"))
    }
}
