//! Selective Vectorization Manager.
//!
//! [`SelectiveVectorizer`] is the entry point for everything that turns HTA
//! data into vectors and back:
//!
//! - builds an [`EmbeddingPrompt`] from the semantic part of an entity and
//!   embeds it at the type's dimension
//! - writes the vector with identity metadata only, and the fast-changing
//!   scalars to the [`MetadataSidecar`]
//! - answers similarity, recommendation and cross-project insight queries,
//!   caching the cacheable ones
//! - routes every backend failure through the corruption detector: a match
//!   triggers recovery and the call returns a degraded result, anything else
//!   is returned unchanged

use canopy_core::traits::ConfigProvider;
use canopy_core::{Error, Result};
use canopy_vector::normalize::prepare_vector_with_dimension;
use canopy_vector::{
    CacheKey, CacheStats, CorruptionDetector, EmbeddingProvider, Metadata, OperationCache,
    ProviderStrategy, QueryOptions, ScoredRecord, StoreStatus, VectorId, VectorProvider,
    VectorStore, namespace_prefix, strategies_from_config,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::{DURATION_TOLERANCE, SemanticConfig};
use crate::prompt::EmbeddingPrompt;
use crate::recovery::{RecoveryCoordinator, RecoveryReport};
use crate::sidecar::{MetadataSidecar, SidecarDocument, SidecarEntry};
use crate::types::{
    BulkVectorizeReport, HtaEntity, HtaSnapshot, RecommendationContext, SemanticMatch,
    TypeStatus, VectorizationStatus, VectorizationType, WriteOutcome,
};

const INSIGHTS_OPERATION: &str = "cross_project_insights";

/// Over-fetch factor for insight queries, which drop the caller's own hits.
const INSIGHTS_OVERFETCH: usize = 3;

/// Embeds HTA content selectively and serves semantic queries over it.
pub struct SelectiveVectorizer {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    sidecar: Arc<MetadataSidecar>,
    cache: Arc<OperationCache<Vec<SemanticMatch>>>,
    recovery: Arc<RecoveryCoordinator>,
    init: OnceCell<StoreStatus>,
    preview_chars: usize,
}

impl SelectiveVectorizer {
    /// Create a vectorizer over an explicit strategy chain.
    pub fn new(
        strategies: Vec<Box<dyn ProviderStrategy>>,
        sidecar_root: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &SemanticConfig,
    ) -> Self {
        let sidecar = Arc::new(MetadataSidecar::new(sidecar_root));
        let cache = Arc::new(OperationCache::from_config(&config.cache));
        let recovery = Arc::new(RecoveryCoordinator::new(sidecar.clone(), cache.clone()));
        let detector = Arc::new(CorruptionDetector::from_config(&config.corruption));
        let store = VectorStore::new(strategies, detector).with_recovery_hook(recovery.clone());

        Self {
            store: Arc::new(store),
            embedder,
            sidecar,
            cache,
            recovery,
            init: OnceCell::new(),
            preview_chars: config.content.preview_chars,
        }
    }

    /// Create a vectorizer whose chain comes from `config.vector`.
    pub fn from_config(
        config: &SemanticConfig,
        sidecar_root: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self::new(
            strategies_from_config(&config.vector),
            sidecar_root,
            embedder,
            config,
        )
    }

    /// Create a vectorizer whose directories come from the application.
    ///
    /// Unset local provider paths resolve under the app's vector directory;
    /// the sidecar lives in its sidecar directory.
    pub fn for_app<C: ConfigProvider>(
        app: &C,
        config: &SemanticConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let mut config = config.clone();
        config.vector.resolve_paths(&app.vector_dir()?);
        Ok(Self::from_config(&config, app.sidecar_dir()?, embedder))
    }

    /// The underlying vector store.
    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    /// The metadata sidecar.
    pub fn sidecar(&self) -> &Arc<MetadataSidecar> {
        &self.sidecar
    }

    /// Name of the embedding provider.
    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    // ------------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------------

    async fn ensure_initialized(&self) -> Result<Arc<dyn VectorProvider>> {
        self.init
            .get_or_try_init(|| self.store.initialize())
            .await?;
        self.store.provider().await
    }

    /// Run `fut`; on a corruption signature recover and return `degraded`.
    async fn guarded<T, F>(&self, operation: &str, degraded: T, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match fut.await {
            Ok(value) => Ok(value),
            Err(e) if self.store.detector().is_corruption(&e) => {
                log::warn!("{operation} hit a corruption signature: {e}");
                self.store.mark_degraded().await;
                if let Err(re) = self.store.recover(&format!("{operation}: {e}")).await {
                    log::error!("Recovery after {operation} failed: {re}");
                }
                Ok(degraded)
            }
            Err(e) => Err(e),
        }
    }

    async fn embed(&self, prompt: &EmbeddingPrompt, ty: VectorizationType) -> Result<Vec<f32>> {
        let raw = self.embedder.embed(&prompt.render(), ty.dimension()).await?;
        prepare_vector_with_dimension(&raw, ty.dimension())
    }

    fn invalidate(&self, project_id: &str) {
        let removed = self
            .cache
            .invalidate_where(|k| k.project_id == project_id || k.operation == INSIGHTS_OPERATION);
        if removed > 0 {
            log::debug!("Invalidated {removed} cached results for {project_id}");
        }
    }

    fn identity_metadata(
        &self,
        project_id: &str,
        ty: VectorizationType,
        entity: &HtaEntity,
    ) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("project_id".into(), project_id.into());
        metadata.insert("vectorization_type".into(), ty.as_str().into());
        metadata.insert("entity_kind".into(), ty.entity_kind().into());
        metadata.insert("local_id".into(), entity.id.clone().into());
        metadata.insert("depth".into(), entity.depth.into());
        if let Some(parent) = &entity.parent_id {
            metadata.insert("parent_id".into(), parent.clone().into());
        }
        let preview: String = entity.content.trim().chars().take(self.preview_chars).collect();
        metadata.insert("content".into(), preview.into());
        metadata
    }

    /// Turn raw hits into matches carrying their sidecar rows.
    async fn enrich(&self, hits: Vec<ScoredRecord>) -> Vec<SemanticMatch> {
        let mut documents: HashMap<(String, VectorizationType), Option<SidecarDocument>> =
            HashMap::new();
        let mut matches = Vec::with_capacity(hits.len());

        for hit in hits {
            let id = match VectorId::parse(hit.id()) {
                Ok(id) => id,
                Err(e) => {
                    log::debug!("Skipping foreign vector '{}': {e}", hit.id());
                    continue;
                }
            };
            let ty = hit
                .metadata()
                .get("vectorization_type")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<VectorizationType>().ok())
                .or_else(|| VectorizationType::from_entity_kind(id.entity_kind()));

            let sidecar = match ty {
                Some(ty) => {
                    let key = (id.project_id().to_string(), ty);
                    if !documents.contains_key(&key) {
                        let doc = match self.sidecar.load(id.project_id(), ty).await {
                            Ok(doc) => Some(doc),
                            Err(e) => {
                                log::warn!("Sidecar lookup for {} failed: {e}", hit.id());
                                None
                            }
                        };
                        documents.insert(key.clone(), doc);
                    }
                    documents
                        .get(&key)
                        .and_then(|doc| doc.as_ref())
                        .and_then(|doc| doc.entries.get(id.local_id()))
                        .cloned()
                }
                None => None,
            };

            matches.push(SemanticMatch {
                vector_id: hit.id().to_string(),
                project_id: id.project_id().to_string(),
                local_id: id.local_id().to_string(),
                vectorization_type: ty,
                similarity: hit.similarity,
                content: hit
                    .metadata()
                    .get("content")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                sidecar,
            });
        }

        matches
    }

    // ------------------------------------------------------------------------
    // Vectorization
    // ------------------------------------------------------------------------

    /// Embed and store one entity, then record it in the sidecar.
    ///
    /// # Errors
    ///
    /// `Validation` for empty content, an unusable id, or an embedding of the
    /// wrong length or with non-finite values. Nothing is written in those
    /// cases.
    pub async fn vectorize_entity(
        &self,
        project_id: &str,
        ty: VectorizationType,
        entity: &HtaEntity,
    ) -> Result<WriteOutcome> {
        if entity.content.trim().is_empty() {
            return Err(Error::validation(format!(
                "{} '{}' has no content to embed",
                ty.entity_kind(),
                entity.id
            )));
        }
        let id = VectorId::new(project_id, ty.entity_kind(), entity.id.as_str())?;
        let vector = self.embed(&EmbeddingPrompt::for_entity(ty, entity), ty).await?;
        let metadata = self.identity_metadata(project_id, ty, entity);

        let outcome = self
            .guarded("vectorize", WriteOutcome::Degraded, async {
                let provider = self.ensure_initialized().await?;
                provider
                    .upsert_vector(&id.to_string(), &vector, &metadata)
                    .await?;
                Ok(WriteOutcome::Applied)
            })
            .await?;

        if outcome == WriteOutcome::Applied {
            self.sidecar
                .record_vectorized(project_id, ty, &entity.id, &entity.fields)
                .await?;
            log::debug!("Vectorized {id}");
        }
        self.invalidate(project_id);
        Ok(outcome)
    }

    /// Vectorize the project goal.
    pub async fn vectorize_goal(&self, project_id: &str, goal: &HtaEntity) -> Result<WriteOutcome> {
        self.vectorize_entity(project_id, VectorizationType::Goal, goal)
            .await
    }

    /// Vectorize a strategic branch.
    pub async fn vectorize_branch(
        &self,
        project_id: &str,
        branch: &HtaEntity,
    ) -> Result<WriteOutcome> {
        self.vectorize_entity(project_id, VectorizationType::Branch, branch)
            .await
    }

    /// Vectorize a task.
    pub async fn vectorize_task(&self, project_id: &str, task: &HtaEntity) -> Result<WriteOutcome> {
        self.vectorize_entity(project_id, VectorizationType::Task, task)
            .await
    }

    /// Vectorize a learning event.
    pub async fn vectorize_learning_event(
        &self,
        project_id: &str,
        event: &HtaEntity,
    ) -> Result<WriteOutcome> {
        self.vectorize_entity(project_id, VectorizationType::LearningEvent, event)
            .await
    }

    /// Vectorize a free-text user context snippet.
    pub async fn vectorize_user_context(
        &self,
        project_id: &str,
        context_id: &str,
        text: &str,
    ) -> Result<WriteOutcome> {
        let entity = HtaEntity::new(context_id, text);
        self.vectorize_entity(project_id, VectorizationType::UserContext, &entity)
            .await
    }

    /// Vectorize a breakthrough insight.
    pub async fn vectorize_breakthrough(
        &self,
        project_id: &str,
        insight: &HtaEntity,
    ) -> Result<WriteOutcome> {
        self.vectorize_entity(project_id, VectorizationType::Breakthrough, insight)
            .await
    }

    /// Vectorize a project's goal, branches and tasks.
    ///
    /// Individual failures are counted, not returned; only an unusable project
    /// id or a store that cannot initialize fails the whole call.
    pub async fn bulk_vectorize(
        &self,
        project_id: &str,
        snapshot: &HtaSnapshot,
    ) -> Result<BulkVectorizeReport> {
        validate_project_id(project_id)?;
        self.ensure_initialized().await?;

        let items = snapshot
            .goal
            .iter()
            .map(|g| (VectorizationType::Goal, g))
            .chain(snapshot.branches.iter().map(|b| (VectorizationType::Branch, b)))
            .chain(snapshot.tasks.iter().map(|t| (VectorizationType::Task, t)));

        let mut report = BulkVectorizeReport::default();
        for (ty, entity) in items {
            match self.vectorize_entity(project_id, ty, entity).await {
                Ok(WriteOutcome::Applied) => {
                    report.vectorized += 1;
                    match ty {
                        VectorizationType::Goal => report.types.goals += 1,
                        VectorizationType::Branch => report.types.branches += 1,
                        _ => report.types.tasks += 1,
                    }
                }
                Ok(WriteOutcome::Degraded) => report.errors += 1,
                Err(e) => {
                    log::warn!("Failed to vectorize {} '{}': {e}", ty.entity_kind(), entity.id);
                    report.errors += 1;
                }
            }
        }

        log::info!(
            "Bulk vectorized {project_id}: {} stored, {} errors",
            report.vectorized,
            report.errors
        );
        Ok(report)
    }

    /// Merge scalars into an entity's sidecar row without re-embedding.
    pub async fn update_entity_fields(
        &self,
        project_id: &str,
        ty: VectorizationType,
        entity_id: &str,
        fields: &Metadata,
    ) -> Result<()> {
        self.sidecar
            .update_fields(project_id, ty, entity_id, fields)
            .await?;
        self.invalidate(project_id);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Entities of type `ty` in a project most similar to `query`.
    pub async fn find_similar(
        &self,
        project_id: &str,
        ty: VectorizationType,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SemanticMatch>> {
        validate_project_id(project_id)?;
        let query = require_query(query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let key = CacheKey::new(format!("find_similar:{ty}"), project_id, query, limit);
        if ty.cache_eligible()
            && let Some(cached) = self.cache.get(&key)
        {
            log::trace!("Cache hit for find_similar:{ty} in {project_id}");
            return Ok(cached);
        }

        let vector = self.embed(&EmbeddingPrompt::free_text(ty, query), ty).await?;
        self.guarded("find_similar", Vec::new(), async {
            let provider = self.ensure_initialized().await?;
            let options = QueryOptions::new(limit)
                .with_filter("project_id", project_id)
                .with_filter("vectorization_type", ty.as_str());
            let hits = provider.query_vectors(&vector, &options).await?;
            let matches = self.enrich(hits).await;
            if ty.cache_eligible() {
                self.cache.insert(key, matches.clone());
            }
            Ok(matches)
        })
        .await
    }

    /// Tasks in a project most similar to `query`.
    pub async fn find_similar_tasks(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SemanticMatch>> {
        self.find_similar(project_id, VectorizationType::Task, query, limit)
            .await
    }

    /// Recommend open tasks that fit the available time, ranked by
    /// similarity to the context query.
    ///
    /// The sidecar decides which tasks are candidates (vectorized, not
    /// completed, not much longer than the available time); the vector query
    /// only ranks them. No embedding happens when nothing qualifies.
    pub async fn recommend_tasks(
        &self,
        project_id: &str,
        context: &RecommendationContext,
    ) -> Result<Vec<SemanticMatch>> {
        validate_project_id(project_id)?;
        let query = require_query(&context.query)?;
        if context.limit == 0 {
            return Ok(Vec::new());
        }

        let max_minutes = context
            .available_minutes
            .map(|m| f64::from(m) * DURATION_TOLERANCE);
        let entries = self
            .sidecar
            .entries(project_id, VectorizationType::Task)
            .await?;
        // Non-candidates still rank in the vector query, so fetch every
        // vectorized task and filter afterwards.
        let vectorized = entries.iter().filter(|e| e.vectorized).count();
        let candidates: HashSet<String> = entries
            .into_iter()
            .filter(|e| is_candidate(e, max_minutes))
            .map(|e| e.id)
            .collect();

        if candidates.is_empty() {
            log::debug!("No candidate tasks in {project_id}");
            return Ok(Vec::new());
        }

        let ty = VectorizationType::Task;
        let vector = self.embed(&EmbeddingPrompt::free_text(ty, query), ty).await?;
        self.guarded("recommend_tasks", Vec::new(), async {
            let provider = self.ensure_initialized().await?;
            let options = QueryOptions::new(vectorized)
                .with_filter("project_id", project_id)
                .with_filter("vectorization_type", ty.as_str());
            let hits = provider.query_vectors(&vector, &options).await?;
            let mut matches: Vec<SemanticMatch> = self
                .enrich(hits)
                .await
                .into_iter()
                .filter(|m| candidates.contains(&m.local_id))
                .collect();
            matches.truncate(context.limit);
            Ok(matches)
        })
        .await
    }

    /// Breakthrough insights from other projects similar to `query`.
    pub async fn find_cross_project_insights(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SemanticMatch>> {
        validate_project_id(project_id)?;
        let query = require_query(query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let key = CacheKey::new(INSIGHTS_OPERATION, project_id, query, limit);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let ty = VectorizationType::Breakthrough;
        let vector = self.embed(&EmbeddingPrompt::free_text(ty, query), ty).await?;
        self.guarded("find_cross_project_insights", Vec::new(), async {
            let provider = self.ensure_initialized().await?;
            let options = QueryOptions::new(limit.saturating_mul(INSIGHTS_OVERFETCH))
                .with_filter("vectorization_type", ty.as_str());
            let hits = provider.query_vectors(&vector, &options).await?;
            let mut matches: Vec<SemanticMatch> = self
                .enrich(hits)
                .await
                .into_iter()
                .filter(|m| m.project_id != project_id)
                .collect();
            matches.truncate(limit);
            self.cache.insert(key, matches.clone());
            Ok(matches)
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------------

    /// Delete every vector in a project. Returns the number removed.
    pub async fn delete_project_vectors(&self, project_id: &str) -> Result<usize> {
        validate_project_id(project_id)?;
        let prefix = namespace_prefix(project_id, None);
        let removed = self
            .guarded("delete_project_vectors", 0, async {
                let provider = self.ensure_initialized().await?;
                provider.delete_namespace(&prefix).await
            })
            .await?;

        self.sidecar
            .mark_unvectorized(project_id, &VectorizationType::ALL)
            .await?;
        self.invalidate(project_id);
        log::info!("Deleted {removed} vectors for {project_id}");
        Ok(removed)
    }

    /// Delete a project's vectors of one type. Returns the number removed.
    pub async fn delete_entity_vectors(
        &self,
        project_id: &str,
        ty: VectorizationType,
    ) -> Result<usize> {
        validate_project_id(project_id)?;
        let prefix = namespace_prefix(project_id, Some(ty.entity_kind()));
        let removed = self
            .guarded("delete_entity_vectors", 0, async {
                let provider = self.ensure_initialized().await?;
                provider.delete_namespace(&prefix).await
            })
            .await?;

        self.sidecar.mark_unvectorized(project_id, &[ty]).await?;
        self.invalidate(project_id);
        log::info!("Deleted {removed} {} vectors for {project_id}", ty.entity_kind());
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Status and lifecycle
    // ------------------------------------------------------------------------

    /// Sidecar-derived vectorization status of a project.
    pub async fn vectorization_status(&self, project_id: &str) -> Result<VectorizationStatus> {
        let mut status = VectorizationStatus {
            project_id: project_id.to_string(),
            ..Default::default()
        };

        for ty in VectorizationType::ALL {
            let doc = self.sidecar.load(project_id, ty).await?;
            if doc.entries.is_empty() && doc.last_vectorized.is_none() {
                continue;
            }
            let type_status = TypeStatus {
                total: doc.entries.len(),
                vectorized: doc.entries.values().filter(|e| e.vectorized).count(),
                last_vectorized: doc.last_vectorized,
            };
            status.total_entities += type_status.total;
            status.vectorized_entities += type_status.vectorized;
            status.by_type.insert(ty.as_str().to_string(), type_status);
        }

        status.last_recovery = self.sidecar.recovery_log(project_id).await?.pop();
        Ok(status)
    }

    /// Current store status; does not initialize.
    pub async fn store_status(&self) -> StoreStatus {
        self.store.status().await
    }

    /// Initialize if needed, run the store self-test and report the status.
    ///
    /// A self-test failing with a corruption signature runs recovery.
    pub async fn health(&self) -> Result<StoreStatus> {
        self.guarded("self_test", (), async {
            self.ensure_initialized().await?;
            self.store.self_test().await
        })
        .await?;
        Ok(self.store.status().await)
    }

    /// Query cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Run recovery now, regardless of any error.
    pub async fn recover_now(&self, reason: &str) -> Result<RecoveryReport> {
        self.ensure_initialized().await?;
        self.store.recover(reason).await?;
        Ok(self.recovery.last_report().unwrap_or_default())
    }

    /// The most recent recovery report, if recovery has run.
    pub fn last_recovery(&self) -> Option<RecoveryReport> {
        self.recovery.last_report()
    }

    /// Close the vector store.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}

impl std::fmt::Debug for SelectiveVectorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectiveVectorizer")
            .field("store", &self.store)
            .field("embedder", &self.embedder.name())
            .field("sidecar", &self.sidecar.root())
            .finish()
    }
}

fn is_candidate(entry: &SidecarEntry, max_minutes: Option<f64>) -> bool {
    if !entry.vectorized || entry.is_completed() {
        return false;
    }
    match (max_minutes, entry.duration_minutes()) {
        (Some(max), Some(duration)) => duration <= max,
        _ => true,
    }
}

fn require_query(query: &str) -> Result<&str> {
    let query = query.trim();
    if query.is_empty() {
        return Err(Error::validation("query text must not be empty"));
    }
    Ok(query)
}

fn validate_project_id(project_id: &str) -> Result<()> {
    if project_id.is_empty() || project_id.contains(':') {
        return Err(Error::validation(format!(
            "project id '{project_id}' must be non-empty and must not contain ':'"
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
