//! Corruption recovery.
//!
//! When a backend error matches a corruption signature the coordinator
//! resets the provider's collections, drops every cached query result and
//! flips the sidecar's `vectorized` flags so the data gets re-embedded. Each
//! step logs its failure and moves on: recovery itself never fails, and
//! running it twice leaves the same state as running it once.

use async_trait::async_trait;
use canopy_vector::{OperationCache, RecoveryHook, VectorProvider};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::sidecar::MetadataSidecar;
use crate::types::SemanticMatch;

/// What one recovery pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// RFC 3339 start time.
    pub started_at: String,
    pub reason: String,
    pub provider: String,
    pub provider_reset: bool,
    pub cache_entries_cleared: usize,
    pub projects_touched: usize,
    pub entries_reset: usize,
    /// Step failures, in order.
    pub errors: Vec<String>,
}

/// Runs the recovery procedure; registered with the vector store as its
/// [`RecoveryHook`].
pub struct RecoveryCoordinator {
    sidecar: Arc<MetadataSidecar>,
    cache: Arc<OperationCache<Vec<SemanticMatch>>>,
    last_report: Mutex<Option<RecoveryReport>>,
}

impl RecoveryCoordinator {
    /// Create a coordinator over the sidecar and query cache it resets.
    pub fn new(
        sidecar: Arc<MetadataSidecar>,
        cache: Arc<OperationCache<Vec<SemanticMatch>>>,
    ) -> Self {
        Self {
            sidecar,
            cache,
            last_report: Mutex::new(None),
        }
    }

    /// Run recovery against `provider`.
    pub async fn run(&self, provider: &dyn VectorProvider, reason: &str) -> RecoveryReport {
        let mut report = RecoveryReport {
            started_at: Utc::now().to_rfc3339(),
            reason: reason.to_string(),
            provider: provider.name().to_string(),
            ..Default::default()
        };
        log::warn!("Starting recovery on '{}': {reason}", provider.name());

        match provider.reset().await {
            Ok(()) => {
                report.provider_reset = true;
                log::info!("Recovery: provider '{}' reset", provider.name());
            }
            Err(e) => {
                log::error!("Recovery: provider reset failed: {e}");
                report.errors.push(format!("provider reset: {e}"));
            }
        }

        report.cache_entries_cleared = self.cache.len();
        self.cache.clear();
        log::info!(
            "Recovery: cleared {} cached results",
            report.cache_entries_cleared
        );

        let summary = self.sidecar.mark_all_unvectorized(reason).await;
        report.projects_touched = summary.projects_touched;
        report.entries_reset = summary.entries_reset;
        report
            .errors
            .extend(summary.errors.into_iter().map(|e| format!("sidecar: {e}")));
        log::info!(
            "Recovery: reset {} sidecar entries across {} projects",
            report.entries_reset,
            report.projects_touched
        );

        if report.errors.is_empty() {
            log::info!("Recovery complete");
        } else {
            log::warn!("Recovery complete with {} errors", report.errors.len());
        }

        *self.last_report.lock().unwrap_or_else(|p| p.into_inner()) = Some(report.clone());
        report
    }

    /// The most recent report, if recovery has run.
    pub fn last_report(&self) -> Option<RecoveryReport> {
        self.last_report
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl std::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("sidecar", &self.sidecar.root())
            .field("cached", &self.cache.len())
            .finish()
    }
}

#[async_trait]
impl RecoveryHook for RecoveryCoordinator {
    async fn recover(&self, provider: &dyn VectorProvider, reason: &str) {
        self.run(provider, reason).await;
    }
}
