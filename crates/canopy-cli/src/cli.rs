//! CLI argument parsing and command definitions.

use clap::{Parser, Subcommand};

// ============================================================================
// CLI argument types
// ============================================================================

/// Resilient vector storage for hierarchical task data.
#[derive(Parser, Debug)]
#[command(name = "canopy", author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "CANOPY_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize the vector store, run the self-test and print its status.
    Health,

    /// Show a project's vectorization status.
    Status {
        /// Project id.
        #[arg(short, long)]
        project: String,
    },

    /// Semantic search within a project.
    Search {
        /// Project id.
        #[arg(short, long)]
        project: String,

        /// Free-text query.
        #[arg(short = 'Q', long)]
        query: String,

        /// Entity kind: goal, branch, task, learning, context, breakthrough.
        #[arg(short, long, default_value = "task")]
        kind: String,

        /// Maximum number of results.
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Reset the active provider and mark every entity for re-vectorization.
    Recover {
        /// Reason recorded in each project's recovery log.
        #[arg(short, long, default_value = "manual recovery")]
        reason: String,
    },

    /// Delete a project's vectors.
    Delete {
        /// Project id.
        #[arg(short, long)]
        project: String,

        /// Only delete vectors of this entity kind.
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Configuration operations.
    Config(ConfigCommand),
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Print the effective configuration as TOML.
    Show,

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Tests
// ============================================================================
