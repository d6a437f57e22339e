//! Metadata sidecar.
//!
//! Fast-changing scalars (completion, priority, duration, ...) never go into
//! an embedding. They live here instead, one JSON document per project and
//! vectorization type:
//!
//! ```text
//! {root}/{project}/task_metadata.json
//! {root}/{project}/goal_metadata.json
//! {root}/{project}/recovery_log.json
//! ```
//!
//! Writes are serialized through a single async lock and land atomically, so
//! concurrent readers always see a whole document.

use canopy_core::util::files::{list_subdirs, read_json, write_json_atomic};
use canopy_core::{Error, Result};
use canopy_vector::Metadata;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::types::VectorizationType;

const RECOVERY_LOG: &str = "recovery_log";

// ============================================================================
// Documents
// ============================================================================

/// One entity's sidecar row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarEntry {
    pub id: String,

    /// Whether a current vector exists for this entity.
    #[serde(default)]
    pub vectorized: bool,

    /// RFC 3339 time of the last successful vectorization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_vectorized: Option<String>,

    /// Scalars kept out of the embedding.
    #[serde(flatten)]
    pub fields: Metadata,
}

impl SidecarEntry {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vectorized: false,
            last_vectorized: None,
            fields: Metadata::new(),
        }
    }

    /// True when the row carries `completed: true`.
    pub fn is_completed(&self) -> bool {
        self.fields
            .get("completed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// The `duration_minutes` scalar, if numeric.
    pub fn duration_minutes(&self) -> Option<f64> {
        self.fields.get("duration_minutes").and_then(|v| v.as_f64())
    }
}

/// A per-project, per-type sidecar document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SidecarDocument {
    #[serde(default)]
    pub vectorized: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_vectorized: Option<String>,

    #[serde(default)]
    pub entries: BTreeMap<String, SidecarEntry>,
}

/// One recovery pass as seen by a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub project_id: String,
    /// RFC 3339.
    pub timestamp: String,
    pub reason: String,
    /// Dotted paths of the flags that were flipped.
    pub fields_reset: Vec<String>,
}

/// Result of [`MetadataSidecar::mark_all_unvectorized`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SidecarResetSummary {
    /// Projects with at least one flag flipped.
    pub projects_touched: usize,
    /// Entity rows flipped.
    pub entries_reset: usize,
    /// Documents that could not be read or written.
    pub errors: Vec<String>,
}

// ============================================================================
// MetadataSidecar
// ============================================================================

/// File-backed sidecar store.
#[derive(Debug)]
pub struct MetadataSidecar {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl MetadataSidecar {
    /// Create a sidecar rooted at `root`. Nothing is created until the first
    /// write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The sidecar root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, project_id: &str) -> Result<PathBuf> {
        validate_project_id(project_id)?;
        Ok(self.root.join(project_id))
    }

    fn document_path(&self, project_id: &str, name: &str) -> Result<PathBuf> {
        Ok(self.project_dir(project_id)?.join(format!("{name}.json")))
    }

    /// Load a document; a missing document is empty.
    pub async fn load(&self, project_id: &str, ty: VectorizationType) -> Result<SidecarDocument> {
        let path = self.document_path(project_id, ty.sidecar_document())?;
        Ok(read_json(&path).await?.unwrap_or_default())
    }

    async fn store(
        &self,
        project_id: &str,
        ty: VectorizationType,
        doc: &SidecarDocument,
    ) -> Result<()> {
        let path = self.document_path(project_id, ty.sidecar_document())?;
        write_json_atomic(&path, doc).await
    }

    /// Record a successful vectorization and merge the entity's scalars.
    pub async fn record_vectorized(
        &self,
        project_id: &str,
        ty: VectorizationType,
        entity_id: &str,
        fields: &Metadata,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load(project_id, ty).await?;
        let now = Utc::now().to_rfc3339();

        let entry = doc
            .entries
            .entry(entity_id.to_string())
            .or_insert_with(|| SidecarEntry::new(entity_id));
        entry.vectorized = true;
        entry.last_vectorized = Some(now.clone());
        merge_fields(&mut entry.fields, fields);

        doc.vectorized = true;
        doc.last_vectorized = Some(now);
        self.store(project_id, ty, &doc).await?;
        log::debug!("Sidecar: {project_id}/{} {entity_id} vectorized", ty.sidecar_document());
        Ok(())
    }

    /// Merge scalars into an entity row without touching its vector state.
    ///
    /// Creates an unvectorized row when none exists.
    pub async fn update_fields(
        &self,
        project_id: &str,
        ty: VectorizationType,
        entity_id: &str,
        fields: &Metadata,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load(project_id, ty).await?;
        let entry = doc
            .entries
            .entry(entity_id.to_string())
            .or_insert_with(|| SidecarEntry::new(entity_id));
        merge_fields(&mut entry.fields, fields);
        self.store(project_id, ty, &doc).await
    }

    /// Look up one row.
    pub async fn entry(
        &self,
        project_id: &str,
        ty: VectorizationType,
        entity_id: &str,
    ) -> Result<Option<SidecarEntry>> {
        Ok(self.load(project_id, ty).await?.entries.remove(entity_id))
    }

    /// All rows of a document, ordered by id.
    pub async fn entries(
        &self,
        project_id: &str,
        ty: VectorizationType,
    ) -> Result<Vec<SidecarEntry>> {
        Ok(self.load(project_id, ty).await?.entries.into_values().collect())
    }

    /// Flip the vectorized flags of the given documents to false, keeping
    /// their scalars. Returns the number of rows flipped.
    pub async fn mark_unvectorized(
        &self,
        project_id: &str,
        types: &[VectorizationType],
    ) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut flipped = 0;
        for ty in types {
            let mut doc = self.load(project_id, *ty).await?;
            let (doc_changed, rows) = clear_flags(&mut doc);
            if doc_changed || !rows.is_empty() {
                flipped += rows.len();
                self.store(project_id, *ty, &doc).await?;
            }
        }
        Ok(flipped)
    }

    /// Projects that have a sidecar directory.
    pub async fn projects(&self) -> Result<Vec<String>> {
        list_subdirs(&self.root).await
    }

    /// The project's recovery history, oldest first.
    pub async fn recovery_log(&self, project_id: &str) -> Result<Vec<RecoveryRecord>> {
        let path = self.document_path(project_id, RECOVERY_LOG)?;
        Ok(read_json(&path).await?.unwrap_or_default())
    }

    /// Flip every vectorized flag in every project to false.
    ///
    /// Each project whose data changed gets a [`RecoveryRecord`]. Unreadable
    /// documents are skipped and reported; this never fails as a whole.
    pub async fn mark_all_unvectorized(&self, reason: &str) -> SidecarResetSummary {
        let mut summary = SidecarResetSummary::default();
        let projects = match self.projects().await {
            Ok(projects) => projects,
            Err(e) => {
                log::error!("Sidecar walk failed to list projects: {e}");
                summary.errors.push(e.to_string());
                return summary;
            }
        };

        let _guard = self.write_lock.lock().await;
        for project_id in projects {
            if validate_project_id(&project_id).is_err() {
                continue;
            }
            let mut fields_reset = Vec::new();

            for ty in VectorizationType::ALL {
                let doc_name = ty.sidecar_document();
                let mut doc = match self.load(&project_id, ty).await {
                    Ok(doc) => doc,
                    Err(e) => {
                        log::warn!("Skipping {project_id}/{doc_name}: {e}");
                        summary.errors.push(format!("{project_id}/{doc_name}: {e}"));
                        continue;
                    }
                };

                let (doc_changed, rows) = clear_flags(&mut doc);
                if !doc_changed && rows.is_empty() {
                    continue;
                }
                if let Err(e) = self.store(&project_id, ty, &doc).await {
                    log::warn!("Failed to rewrite {project_id}/{doc_name}: {e}");
                    summary.errors.push(format!("{project_id}/{doc_name}: {e}"));
                    continue;
                }

                if doc_changed {
                    fields_reset.push(format!("{doc_name}.vectorized"));
                }
                summary.entries_reset += rows.len();
                fields_reset.extend(rows.iter().map(|id| format!("{doc_name}.{id}.vectorized")));
            }

            if fields_reset.is_empty() {
                continue;
            }
            summary.projects_touched += 1;
            let record = RecoveryRecord {
                project_id: project_id.clone(),
                timestamp: Utc::now().to_rfc3339(),
                reason: reason.to_string(),
                fields_reset,
            };
            if let Err(e) = self.append_recovery_record(record).await {
                log::warn!("Failed to append recovery record for {project_id}: {e}");
                summary.errors.push(format!("{project_id}/{RECOVERY_LOG}: {e}"));
            }
        }

        summary
    }

    async fn append_recovery_record(&self, record: RecoveryRecord) -> Result<()> {
        let path = self.document_path(&record.project_id, RECOVERY_LOG)?;
        let mut log: Vec<RecoveryRecord> = read_json(&path).await?.unwrap_or_default();
        log.push(record);
        write_json_atomic(&path, &log).await
    }
}

fn merge_fields(target: &mut Metadata, fields: &Metadata) {
    for (key, value) in fields {
        target.insert(key.clone(), value.clone());
    }
}

/// Clear document and row flags. Returns whether the document flag changed
/// and the ids of the rows that changed.
fn clear_flags(doc: &mut SidecarDocument) -> (bool, Vec<String>) {
    let doc_changed = std::mem::replace(&mut doc.vectorized, false);
    let rows = doc
        .entries
        .values_mut()
        .filter(|e| e.vectorized)
        .map(|e| {
            e.vectorized = false;
            e.id.clone()
        })
        .collect();
    (doc_changed, rows)
}

fn validate_project_id(project_id: &str) -> Result<()> {
    let bad = project_id.is_empty()
        || project_id == "."
        || project_id == ".."
        || project_id.contains(['/', '\\', ':']);
    if bad {
        return Err(Error::validation(format!(
            "project id '{project_id}' is not usable as a sidecar directory"
        )));
    }
    Ok(())
}
