//! Vector store orchestrator.
//!
//! [`VectorStore`] owns the provider fallback chain. Initialization walks an
//! ordered list of [`ProviderStrategy`] values, connects and initializes each
//! in turn, and accepts the first one that passes a round-trip self-test.
//! Callers then share the chosen provider as `Arc<dyn VectorProvider>`.
//!
//! ```text
//! Uninitialized ─► Initializing ─► SelfTesting ─► Healthy ⇄ Degraded
//!                                                    ▲         │
//!                                                    └ Recovering ◄┘
//! any ─► Closed
//! ```

use async_trait::async_trait;
use canopy_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::corruption::CorruptionDetector;
use crate::provider::VectorProvider;
use crate::providers::build_provider;
use crate::types::{
    Metadata, ProviderConfig, ProviderKind, ProviderMode, ProviderStatus, QueryOptions,
    VectorStoreConfig,
};

/// Dimension of the synthetic self-test vector.
pub const SELF_TEST_DIMENSION: usize = 8;

/// Id prefix of self-test probes; never collides with `project:kind:` ids
/// produced by [`VectorId`](crate::VectorId).
pub const SELF_TEST_PREFIX: &str = "__canopy_selftest__:probe:";

/// Minimum similarity the self-test accepts for an exact match.
const SELF_TEST_MIN_SIMILARITY: f32 = 0.99;

// ============================================================================
// Strategies
// ============================================================================

/// One way of obtaining a provider, tried in fallback order.
#[async_trait]
pub trait ProviderStrategy: Send + Sync {
    /// Which adapter this strategy produces.
    fn kind(&self) -> ProviderKind;

    /// Name for diagnostics.
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    /// Construct the provider. Initialization is left to the store.
    async fn connect(&self) -> Result<Arc<dyn VectorProvider>>;
}

/// Strategy that builds an adapter from its configuration block.
#[derive(Debug, Clone)]
pub struct ConfiguredStrategy {
    kind: ProviderKind,
    config: ProviderConfig,
}

impl ConfiguredStrategy {
    /// Create a strategy for `kind`.
    pub fn new(kind: ProviderKind, config: ProviderConfig) -> Self {
        Self { kind, config }
    }
}

#[async_trait]
impl ProviderStrategy for ConfiguredStrategy {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn connect(&self) -> Result<Arc<dyn VectorProvider>> {
        build_provider(self.kind, &self.config)
    }
}

/// The fallback chain for a configuration: primary, then the configured
/// fallback, then the flat-file provider if neither is already flat-file.
pub fn strategies_from_config(config: &VectorStoreConfig) -> Vec<Box<dyn ProviderStrategy>> {
    let mut kinds = vec![config.primary];
    for kind in [config.fallback, ProviderKind::Flatfile] {
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    kinds
        .into_iter()
        .map(|kind| {
            Box::new(ConfiguredStrategy::new(kind, config.providers.get(kind).clone()))
                as Box<dyn ProviderStrategy>
        })
        .collect()
}

// ============================================================================
// Recovery hook
// ============================================================================

/// Repairs a provider after a corruption signature.
///
/// Implementations must be idempotent and must not fail: errors in individual
/// steps are logged and the next step still runs.
#[async_trait]
pub trait RecoveryHook: Send + Sync {
    /// Run recovery against `provider`.
    async fn recover(&self, provider: &dyn VectorProvider, reason: &str);
}

// ============================================================================
// State and status
// ============================================================================

/// Lifecycle state of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreState {
    Uninitialized,
    Initializing,
    SelfTesting,
    Healthy,
    Degraded,
    Recovering,
    Closed,
}

impl fmt::Display for StoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreState::Uninitialized => "uninitialized",
            StoreState::Initializing => "initializing",
            StoreState::SelfTesting => "self_testing",
            StoreState::Healthy => "healthy",
            StoreState::Degraded => "degraded",
            StoreState::Recovering => "recovering",
            StoreState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Snapshot of the store for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
    /// Active provider, empty before initialization.
    pub provider_name: String,
    /// Active provider's mode.
    pub mode: Option<ProviderMode>,
    /// Active provider's collection identifier.
    pub collection_id: String,
    /// True when the active provider is not the first strategy.
    pub fallback_used: bool,
    pub state: StoreState,
}

struct Active {
    provider: Arc<dyn VectorProvider>,
    status: ProviderStatus,
    fallback_used: bool,
}

struct StoreInner {
    state: StoreState,
    active: Option<Active>,
}

// ============================================================================
// VectorStore
// ============================================================================

/// Provider fallback chain plus lifecycle state.
pub struct VectorStore {
    strategies: Vec<Box<dyn ProviderStrategy>>,
    detector: Arc<CorruptionDetector>,
    hook: Option<Arc<dyn RecoveryHook>>,
    init_lock: Mutex<()>,
    inner: RwLock<StoreInner>,
}

impl VectorStore {
    /// Create a store over an ordered strategy list.
    pub fn new(strategies: Vec<Box<dyn ProviderStrategy>>, detector: Arc<CorruptionDetector>) -> Self {
        Self {
            strategies,
            detector,
            hook: None,
            init_lock: Mutex::new(()),
            inner: RwLock::new(StoreInner {
                state: StoreState::Uninitialized,
                active: None,
            }),
        }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &VectorStoreConfig, detector: Arc<CorruptionDetector>) -> Self {
        Self::new(strategies_from_config(config), detector)
    }

    /// Register the hook run when a corruption signature is seen.
    pub fn with_recovery_hook(mut self, hook: Arc<dyn RecoveryHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// The corruption detector shared with callers.
    pub fn detector(&self) -> &Arc<CorruptionDetector> {
        &self.detector
    }

    /// Names of the configured strategies, in fallback order.
    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    async fn set_state(&self, state: StoreState) {
        self.inner.write().await.state = state;
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> StoreState {
        self.inner.read().await.state
    }

    /// Select and self-test a provider. Idempotent once healthy.
    pub async fn initialize(&self) -> Result<StoreStatus> {
        let _guard = self.init_lock.lock().await;
        {
            let inner = self.inner.read().await;
            if inner.state == StoreState::Closed {
                return Err(Error::closed("vector store is closed"));
            }
            if inner.active.is_some() {
                drop(inner);
                return Ok(self.status().await);
            }
        }

        self.set_state(StoreState::Initializing).await;
        let mut failures = Vec::new();

        for (index, strategy) in self.strategies.iter().enumerate() {
            match self.try_strategy(strategy.as_ref()).await {
                Ok((provider, status)) => {
                    let fallback_used = index > 0;
                    if fallback_used {
                        log::warn!(
                            "Using fallback vector provider '{}' ({})",
                            status.provider_name,
                            failures.join("; ")
                        );
                    } else {
                        log::info!("Using vector provider '{}'", status.provider_name);
                    }
                    let mut inner = self.inner.write().await;
                    inner.active = Some(Active {
                        provider,
                        status,
                        fallback_used,
                    });
                    inner.state = StoreState::Healthy;
                    drop(inner);
                    return Ok(self.status().await);
                }
                Err(e) => {
                    log::warn!("Vector provider '{}' unavailable: {e}", strategy.name());
                    failures.push(format!("{}: {e}", strategy.name()));
                    self.set_state(StoreState::Initializing).await;
                }
            }
        }

        self.set_state(StoreState::Uninitialized).await;
        Err(Error::provider_init(
            "vector store",
            format!("no provider available ({})", failures.join("; ")),
        ))
    }

    async fn try_strategy(
        &self,
        strategy: &dyn ProviderStrategy,
    ) -> Result<(Arc<dyn VectorProvider>, ProviderStatus)> {
        let provider = strategy.connect().await?;
        let status = provider.initialize().await?;
        if !status.success {
            return Err(Error::provider_init(
                strategy.name(),
                "initialization reported failure",
            ));
        }

        self.set_state(StoreState::SelfTesting).await;
        match self_test(provider.as_ref()).await {
            Ok(()) => Ok((provider, status)),
            Err(e) if self.detector.is_corruption(&e) => {
                log::warn!(
                    "Self-test on '{}' hit a corruption signature; recovering: {e}",
                    provider.name()
                );
                self.repair(provider.as_ref(), &e.to_string()).await;
                match self_test(provider.as_ref()).await {
                    Ok(()) => Ok((provider, status)),
                    Err(e) => {
                        close_quietly(provider.as_ref()).await;
                        Err(e)
                    }
                }
            }
            Err(e) => {
                close_quietly(provider.as_ref()).await;
                Err(e)
            }
        }
    }

    /// The active provider.
    pub async fn provider(&self) -> Result<Arc<dyn VectorProvider>> {
        let inner = self.inner.read().await;
        if inner.state == StoreState::Closed {
            return Err(Error::closed("vector store is closed"));
        }
        inner
            .active
            .as_ref()
            .map(|a| a.provider.clone())
            .ok_or_else(|| Error::query("vector store is not initialized"))
    }

    /// Snapshot of the active provider and state.
    pub async fn status(&self) -> StoreStatus {
        let inner = self.inner.read().await;
        match &inner.active {
            Some(active) => StoreStatus {
                provider_name: active.status.provider_name.clone(),
                mode: Some(active.status.mode),
                collection_id: active.status.collection_id.clone(),
                fallback_used: active.fallback_used,
                state: inner.state,
            },
            None => StoreStatus {
                provider_name: String::new(),
                mode: None,
                collection_id: String::new(),
                fallback_used: false,
                state: inner.state,
            },
        }
    }

    /// Re-run the self-test against the active provider.
    pub async fn self_test(&self) -> Result<()> {
        let provider = self.provider().await?;
        self_test(provider.as_ref()).await
    }

    /// Record that the active provider is misbehaving.
    pub async fn mark_degraded(&self) {
        let mut inner = self.inner.write().await;
        if inner.state == StoreState::Healthy {
            inner.state = StoreState::Degraded;
        }
    }

    /// Run recovery against the active provider.
    ///
    /// Uses the registered hook, or a bare provider reset without one. The
    /// store returns to `Healthy` afterwards; concurrent calls each run the
    /// full (idempotent) procedure.
    pub async fn recover(&self, reason: &str) -> Result<()> {
        let provider = self.provider().await?;
        self.set_state(StoreState::Recovering).await;
        log::warn!("Recovering vector provider '{}': {reason}", provider.name());

        self.repair(provider.as_ref(), reason).await;

        let mut inner = self.inner.write().await;
        if inner.state != StoreState::Closed {
            inner.state = StoreState::Healthy;
        }
        Ok(())
    }

    /// The registered hook, or a bare provider reset without one.
    async fn repair(&self, provider: &dyn VectorProvider, reason: &str) {
        match &self.hook {
            Some(hook) => hook.recover(provider, reason).await,
            None => {
                if let Err(e) = provider.reset().await {
                    log::error!("Provider reset failed: {e}");
                }
            }
        }
    }

    /// Close the active provider. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        let active = {
            let mut inner = self.inner.write().await;
            if inner.state == StoreState::Closed {
                return Ok(());
            }
            inner.state = StoreState::Closed;
            inner.active.take()
        };
        if let Some(active) = active {
            active.provider.close().await?;
            log::info!("Vector store closed ({})", active.status.provider_name);
        }
        Ok(())
    }
}

impl fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorStore")
            .field("strategies", &self.strategy_names())
            .field("has_recovery_hook", &self.hook.is_some())
            .finish()
    }
}

async fn close_quietly(provider: &dyn VectorProvider) {
    if let Err(e) = provider.close().await {
        log::debug!("Closing rejected provider '{}' failed: {e}", provider.name());
    }
}

/// Upsert, query back and delete a synthetic probe vector.
pub async fn self_test(provider: &dyn VectorProvider) -> Result<()> {
    let id = format!("{SELF_TEST_PREFIX}{}", Uuid::new_v4());
    let vector: Vec<f32> = (0..SELF_TEST_DIMENSION)
        .map(|i| (i as f32 + 1.0) / SELF_TEST_DIMENSION as f32)
        .collect();
    let mut metadata = Metadata::new();
    metadata.insert("self_test_id".into(), json!(id));

    let outcome = probe(provider, &id, &vector, &metadata).await;

    if let Err(e) = provider.delete_namespace(SELF_TEST_PREFIX).await {
        log::debug!("Self-test cleanup on '{}' failed: {e}", provider.name());
    }
    outcome
}

async fn probe(
    provider: &dyn VectorProvider,
    id: &str,
    vector: &[f32],
    metadata: &Metadata,
) -> Result<()> {
    provider.upsert_vector(id, vector, metadata).await?;

    let options = QueryOptions::new(1).with_filter("self_test_id", id);
    let results = provider.query_vectors(vector, &options).await?;
    match results.first() {
        Some(hit) if hit.id() == id && hit.similarity >= SELF_TEST_MIN_SIMILARITY => {
            log::debug!(
                "Self-test on '{}' passed (similarity {:.4})",
                provider.name(),
                hit.similarity
            );
            Ok(())
        }
        Some(hit) => Err(Error::query(format!(
            "self-test on '{}' returned '{}' with similarity {:.4}",
            provider.name(),
            hit.id(),
            hit.similarity
        ))),
        None => Err(Error::query(format!(
            "self-test on '{}' could not read back its probe",
            provider.name()
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::FlatFileProvider;
    use crate::types::{ScoredRecord, VectorRecord};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Strategy whose provider never comes up.
    struct FailingStrategy;

    #[async_trait]
    impl ProviderStrategy for FailingStrategy {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Qdrant
        }

        async fn connect(&self) -> Result<Arc<dyn VectorProvider>> {
            Err(Error::provider_init("qdrant", "connection refused"))
        }
    }

    /// Provider that connects but never initializes.
    struct RefusingProvider {
        raise: bool,
    }

    #[async_trait]
    impl VectorProvider for RefusingProvider {
        async fn initialize(&self) -> Result<ProviderStatus> {
            if self.raise {
                return Err(Error::provider_init("sqlite", "database is locked"));
            }
            Ok(ProviderStatus {
                success: false,
                provider_name: "sqlite".into(),
                mode: ProviderMode::Embedded,
                collection_id: String::new(),
            })
        }
        async fn upsert_vector(&self, _: &str, _: &[f32], _: &Metadata) -> Result<()> {
            Err(Error::query("not initialized"))
        }
        async fn query_vectors(&self, _: &[f32], _: &QueryOptions) -> Result<Vec<ScoredRecord>> {
            Err(Error::query("not initialized"))
        }
        async fn delete_vector(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
        async fn delete_namespace(&self, _: &str) -> Result<usize> {
            Ok(0)
        }
        async fn list_vectors(&self, _: &str) -> Result<Vec<VectorRecord>> {
            Ok(Vec::new())
        }
        async fn ping(&self) -> Result<()> {
            Err(Error::query("not initialized"))
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
        async fn reset(&self) -> Result<()> {
            Ok(())
        }
        fn name(&self) -> &str {
            "sqlite"
        }
        fn kind(&self) -> ProviderKind {
            ProviderKind::Sqlite
        }
    }

    struct RefusingStrategy {
        raise: bool,
    }

    #[async_trait]
    impl ProviderStrategy for RefusingStrategy {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Sqlite
        }

        async fn connect(&self) -> Result<Arc<dyn VectorProvider>> {
            Ok(Arc::new(RefusingProvider { raise: self.raise }))
        }
    }

    /// Flat-file provider that reports a 500 until it is reset.
    struct FaultyProvider {
        inner: FlatFileProvider,
        corrupt: AtomicBool,
        broken_for_good: bool,
    }

    impl FaultyProvider {
        fn check(&self) -> Result<()> {
            if self.broken_for_good {
                return Err(Error::query("read timed out"));
            }
            if self.corrupt.load(Ordering::SeqCst) {
                return Err(Error::query("Internal Server Error"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl VectorProvider for FaultyProvider {
        async fn initialize(&self) -> Result<ProviderStatus> {
            self.inner.initialize().await
        }
        async fn upsert_vector(&self, id: &str, v: &[f32], m: &Metadata) -> Result<()> {
            self.check()?;
            self.inner.upsert_vector(id, v, m).await
        }
        async fn query_vectors(&self, q: &[f32], o: &QueryOptions) -> Result<Vec<ScoredRecord>> {
            self.check()?;
            self.inner.query_vectors(q, o).await
        }
        async fn delete_vector(&self, id: &str) -> Result<bool> {
            self.inner.delete_vector(id).await
        }
        async fn delete_namespace(&self, prefix: &str) -> Result<usize> {
            self.inner.delete_namespace(prefix).await
        }
        async fn list_vectors(&self, prefix: &str) -> Result<Vec<VectorRecord>> {
            self.inner.list_vectors(prefix).await
        }
        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }
        async fn close(&self) -> Result<()> {
            self.inner.close().await
        }
        async fn reset(&self) -> Result<()> {
            self.corrupt.store(false, Ordering::SeqCst);
            self.inner.reset().await
        }
        fn name(&self) -> &str {
            "faulty"
        }
        fn kind(&self) -> ProviderKind {
            ProviderKind::Lancedb
        }
    }

    struct FaultyStrategy {
        dir: PathBuf,
        broken_for_good: bool,
        connects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProviderStrategy for FaultyStrategy {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Lancedb
        }

        async fn connect(&self) -> Result<Arc<dyn VectorProvider>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FaultyProvider {
                inner: FlatFileProvider::in_dir(&self.dir),
                corrupt: AtomicBool::new(true),
                broken_for_good: self.broken_for_good,
            }))
        }
    }

    /// Hook that resets the provider and counts invocations.
    #[derive(Default)]
    struct CountingHook {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecoveryHook for CountingHook {
        async fn recover(&self, provider: &dyn VectorProvider, _reason: &str) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = provider.reset().await;
        }
    }

    fn flatfile(dir: &std::path::Path) -> Box<dyn ProviderStrategy> {
        Box::new(ConfiguredStrategy::new(
            ProviderKind::Flatfile,
            ProviderConfig::default().with_path(dir.to_string_lossy().into_owned()),
        ))
    }

    fn detector() -> Arc<CorruptionDetector> {
        Arc::new(CorruptionDetector::default())
    }

    #[test]
    fn test_strategies_from_config_order() {
        let config = VectorStoreConfig::default();
        let names: Vec<_> = strategies_from_config(&config)
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["lancedb", "flatfile"]);

        let config = VectorStoreConfig {
            primary: ProviderKind::Qdrant,
            fallback: ProviderKind::Sqlite,
            ..Default::default()
        };
        let names: Vec<_> = strategies_from_config(&config)
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["qdrant", "sqlite", "flatfile"]);
    }

    #[tokio::test]
    async fn test_primary_healthy_no_fallback() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(vec![flatfile(dir.path())], detector());

        let status = store.initialize().await.unwrap();
        assert_eq!(status.provider_name, "flatfile");
        assert_eq!(status.mode, Some(ProviderMode::File));
        assert!(!status.fallback_used);
        assert_eq!(status.state, StoreState::Healthy);
    }

    #[tokio::test]
    async fn test_failing_primary_uses_fallback() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(
            vec![Box::new(FailingStrategy), flatfile(dir.path())],
            detector(),
        );

        let status = store.initialize().await.unwrap();
        assert!(status.fallback_used);
        assert_eq!(status.provider_name, "flatfile");
        assert_eq!(store.provider().await.unwrap().kind(), ProviderKind::Flatfile);
    }

    #[tokio::test]
    async fn test_initialize_error_uses_fallback() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(
            vec![Box::new(RefusingStrategy { raise: true }), flatfile(dir.path())],
            detector(),
        );

        let status = store.initialize().await.unwrap();
        assert!(status.fallback_used);
        assert_eq!(status.provider_name, "flatfile");
        assert_eq!(store.provider().await.unwrap().kind(), ProviderKind::Flatfile);
    }

    #[tokio::test]
    async fn test_initialize_reporting_failure_uses_fallback() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(
            vec![Box::new(RefusingStrategy { raise: false }), flatfile(dir.path())],
            detector(),
        );

        let status = store.initialize().await.unwrap();
        assert!(status.fallback_used);
        assert_eq!(status.provider_name, "flatfile");
        assert_eq!(status.state, StoreState::Healthy);
    }

    #[tokio::test]
    async fn test_all_strategies_fail() {
        let store = VectorStore::new(vec![Box::new(FailingStrategy)], detector());
        let err = store.initialize().await.unwrap_err();
        assert!(err.is_provider_init());
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(store.state().await, StoreState::Uninitialized);
        assert!(store.provider().await.is_err());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let dir = tempdir().unwrap();
        let connects = Arc::new(AtomicUsize::new(0));
        let hook = Arc::new(CountingHook::default());
        let store = VectorStore::new(
            vec![Box::new(FaultyStrategy {
                dir: dir.path().to_path_buf(),
                broken_for_good: false,
                connects: connects.clone(),
            })],
            detector(),
        )
        .with_recovery_hook(hook);

        store.initialize().await.unwrap();
        store.initialize().await.unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_self_test_corruption_runs_hook_then_passes() {
        let dir = tempdir().unwrap();
        let hook = Arc::new(CountingHook::default());
        let store = VectorStore::new(
            vec![
                Box::new(FaultyStrategy {
                    dir: dir.path().join("primary"),
                    broken_for_good: false,
                    connects: Arc::new(AtomicUsize::new(0)),
                }),
                flatfile(&dir.path().join("fallback")),
            ],
            detector(),
        )
        .with_recovery_hook(hook.clone());

        let status = store.initialize().await.unwrap();
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
        assert_eq!(status.provider_name, "flatfile");
        assert!(!status.fallback_used);
        assert_eq!(status.state, StoreState::Healthy);
    }

    #[tokio::test]
    async fn test_self_test_corruption_without_hook_resets_provider() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(
            vec![
                Box::new(FaultyStrategy {
                    dir: dir.path().join("primary"),
                    broken_for_good: false,
                    connects: Arc::new(AtomicUsize::new(0)),
                }),
                flatfile(&dir.path().join("fallback")),
            ],
            detector(),
        );

        let status = store.initialize().await.unwrap();
        assert!(!status.fallback_used);
        assert_eq!(status.state, StoreState::Healthy);
        assert_eq!(store.provider().await.unwrap().name(), "faulty");
    }

    #[tokio::test]
    async fn test_self_test_other_failure_moves_on() {
        let dir = tempdir().unwrap();
        let hook = Arc::new(CountingHook::default());
        let store = VectorStore::new(
            vec![
                Box::new(FaultyStrategy {
                    dir: dir.path().join("primary"),
                    broken_for_good: true,
                    connects: Arc::new(AtomicUsize::new(0)),
                }),
                flatfile(&dir.path().join("fallback")),
            ],
            detector(),
        )
        .with_recovery_hook(hook.clone());

        let status = store.initialize().await.unwrap();
        assert_eq!(hook.calls.load(Ordering::SeqCst), 0);
        assert!(status.fallback_used);
    }

    #[tokio::test]
    async fn test_self_test_leaves_no_residue() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(vec![flatfile(dir.path())], detector());
        store.initialize().await.unwrap();
        store.self_test().await.unwrap();

        let provider = store.provider().await.unwrap();
        assert!(provider.list_vectors("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_degraded_and_recover() {
        let dir = tempdir().unwrap();
        let hook = Arc::new(CountingHook::default());
        let store = VectorStore::new(vec![flatfile(dir.path())], detector())
            .with_recovery_hook(hook.clone());
        store.initialize().await.unwrap();

        store.mark_degraded().await;
        assert_eq!(store.state().await, StoreState::Degraded);

        store.recover("test").await.unwrap();
        assert_eq!(store.state().await, StoreState::Healthy);
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close() {
        let dir = tempdir().unwrap();
        let store = VectorStore::new(vec![flatfile(dir.path())], detector());
        store.initialize().await.unwrap();

        store.close().await.unwrap();
        store.close().await.unwrap();
        assert_eq!(store.state().await, StoreState::Closed);
        assert!(matches!(store.provider().await.err().unwrap(), Error::Closed(_)));
        assert!(matches!(store.initialize().await.unwrap_err(), Error::Closed(_)));
    }
}
