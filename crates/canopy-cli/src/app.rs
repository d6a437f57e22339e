//! Canopy CLI application.
//!
//! Loads configuration, installs logging and dispatches commands to the
//! vectorization layer.

use crate::cli::{CliArgs, Command};
use crate::config::CanopyConfig;
use crate::config_handlers;
use canopy_core::Result;
use canopy_semantic::{SelectiveVectorizer, VectorizationType};
use canopy_vector::{EmbeddingProvider, MockEmbeddingProvider};
use serde::Serialize;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// The `canopy` application.
pub struct CanopyCli {
    config: CanopyConfig,
    version: String,
}

impl CanopyCli {
    /// Create from CLI args, loading config from file/env.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        Ok(Self::new(CanopyConfig::load(args.config.as_deref())?))
    }

    /// Create an application over an already loaded config.
    pub fn new(config: CanopyConfig) -> Self {
        Self {
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// The effective configuration.
    pub fn config(&self) -> &CanopyConfig {
        &self.config
    }

    /// Initialise tracing-based logging.
    ///
    /// Uses `RUST_LOG` if set, otherwise defaults based on verbosity flags.
    /// Library crates log through `log`; the subscriber picks those records
    /// up as well.
    pub fn init_logging(verbose: bool, quiet: bool) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if quiet {
            EnvFilter::new("warn")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        };

        // A subscriber may already be installed (e.g. in tests).
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Run one command.
    pub async fn run(&self, args: CliArgs) -> Result<()> {
        Self::init_logging(args.verbose, args.quiet);

        let command = match args.command {
            Some(Command::Config(config_cmd)) => {
                return config_handlers::handle_config_command(
                    args.config.as_deref(),
                    config_cmd.command,
                );
            }
            Some(command) => command,
            None => {
                println!("canopy {} (use --help for usage)", self.version);
                return Ok(());
            }
        };

        let vectorizer = self.build_vectorizer()?;
        let result = self.dispatch(&vectorizer, command).await;
        if let Err(e) = vectorizer.close().await {
            log::warn!("Closing vector store failed: {e}");
        }
        result
    }

    async fn dispatch(&self, vectorizer: &SelectiveVectorizer, command: Command) -> Result<()> {
        match command {
            Command::Health => {
                let status = vectorizer.health().await?;
                print_json(&status)
            }
            Command::Status { project } => {
                let status = vectorizer.vectorization_status(&project).await?;
                print_json(&status)
            }
            Command::Search {
                project,
                query,
                kind,
                limit,
            } => {
                let ty: VectorizationType = kind.parse()?;
                let hits = vectorizer.find_similar(&project, ty, &query, limit).await?;
                if hits.is_empty() {
                    println!("No matches.");
                }
                for hit in hits {
                    println!(
                        "{:.3}  {}  {}",
                        hit.similarity,
                        hit.vector_id,
                        hit.content.as_deref().unwrap_or("")
                    );
                }
                Ok(())
            }
            Command::Recover { reason } => {
                let report = vectorizer.recover_now(&reason).await?;
                print_json(&report)
            }
            Command::Delete { project, kind } => {
                let removed = match kind {
                    Some(kind) => {
                        let ty: VectorizationType = kind.parse()?;
                        vectorizer.delete_entity_vectors(&project, ty).await?
                    }
                    None => vectorizer.delete_project_vectors(&project).await?,
                };
                println!("Deleted {removed} vectors from {project}");
                Ok(())
            }
            Command::Config(_) => Ok(()),
        }
    }

    /// Build the vectorizer for this configuration.
    pub fn build_vectorizer(&self) -> Result<SelectiveVectorizer> {
        let embedder = self.build_embedder()?;
        log::debug!("Using embedding provider '{}'", embedder.name());
        SelectiveVectorizer::for_app(&self.config, &self.config.semantic_config(), embedder)
    }

    #[cfg(feature = "vector-fastembed")]
    fn build_embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        match &self.config.embedding.model {
            Some(model) => Ok(Arc::new(canopy_vector::FastEmbedProvider::new(
                model,
                self.config.embedding.cache_path.as_deref(),
            )?)),
            None => Ok(Arc::new(MockEmbeddingProvider::new())),
        }
    }

    #[cfg(not(feature = "vector-fastembed"))]
    fn build_embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        if let Some(model) = &self.config.embedding.model {
            log::warn!(
                "Embedding model '{model}' configured but this build lacks vector-fastembed; using the hashing embedder"
            );
        }
        Ok(Arc::new(MockEmbeddingProvider::new()))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_semantic::HtaEntity;
    use canopy_vector::ProviderKind;
    use clap::Parser;

    fn test_config(dir: &std::path::Path) -> CanopyConfig {
        let mut config = CanopyConfig {
            data_dir: Some(dir.to_string_lossy().into_owned()),
            ..Default::default()
        };
        config.vector.primary = ProviderKind::Flatfile;
        config
    }

    #[tokio::test]
    async fn test_run_no_command() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = CanopyCli::new(test_config(dir.path()));
        assert!(cli.run(CliArgs::parse_from(["canopy"])).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_health_creates_local_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = CanopyCli::new(test_config(dir.path()));
        cli.run(CliArgs::parse_from(["canopy", "health"]))
            .await
            .unwrap();
        assert!(dir.path().join("vectors").join("flatfile").exists());
    }

    #[tokio::test]
    async fn test_run_search_and_delete() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = CanopyCli::new(test_config(dir.path()));

        let vectorizer = cli.build_vectorizer().unwrap();
        vectorizer
            .vectorize_task("alpha", &HtaEntity::new("t1", "Outline the essay"))
            .await
            .unwrap();
        vectorizer.close().await.unwrap();

        cli.run(CliArgs::parse_from([
            "canopy", "search", "-p", "alpha", "-Q", "essay outline",
        ]))
        .await
        .unwrap();
        cli.run(CliArgs::parse_from(["canopy", "delete", "-p", "alpha"]))
            .await
            .unwrap();

        let vectorizer = cli.build_vectorizer().unwrap();
        let status = vectorizer.vectorization_status("alpha").await.unwrap();
        assert_eq!(status.vectorized_entities, 0);
    }

    #[tokio::test]
    async fn test_run_search_rejects_unknown_kind() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = CanopyCli::new(test_config(dir.path()));
        let result = cli
            .run(CliArgs::parse_from([
                "canopy", "search", "-p", "alpha", "-Q", "x", "-k", "milestone",
            ]))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_recover_and_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = CanopyCli::new(test_config(dir.path()));
        cli.run(CliArgs::parse_from(["canopy", "recover"]))
            .await
            .unwrap();
        cli.run(CliArgs::parse_from(["canopy", "status", "-p", "alpha"]))
            .await
            .unwrap();
    }

    #[test]
    fn test_init_logging_is_repeatable() {
        CanopyCli::init_logging(false, false);
        CanopyCli::init_logging(true, false);
        CanopyCli::init_logging(false, true);
    }
}
