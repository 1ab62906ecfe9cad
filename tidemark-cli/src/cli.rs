//! CLI argument definitions using clap.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use tidemark_migrate::MigrationKind;

/// Tidemark - versioned SQL and Rust database migrations
#[derive(Parser, Debug)]
#[command(name = "tidemark")]
#[command(version)]
#[command(about = "Tidemark - versioned SQL and Rust database migrations", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory where the dbconf.toml search starts
    #[arg(long, global = true, default_value = "db", env = "TIDEMARK_PATH")]
    pub path: PathBuf,

    /// Environment section of dbconf.toml to use
    #[arg(long, global = true, default_value = "development", env = "TIDEMARK_ENV")]
    pub env: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Migrate to the most recent version on disk
    Up,

    /// Migrate to a specific version, up or down
    MigrateTo(MigrateToArgs),

    /// Roll back the current version
    Down,

    /// Roll back the current version and apply it again
    Redo,

    /// Show the applied state of every migration
    Status,

    /// Print the current database version
    Dbversion,

    /// Create a new migration file
    Create(CreateArgs),

    /// List the database drivers compiled into this binary
    Drivers,
}

// =============================================================================
// Migrate-to Command
// =============================================================================

/// Arguments for the `migrate-to` command
#[derive(Args, Debug)]
pub struct MigrateToArgs {
    /// Target version
    #[arg(id = "target_version", value_name = "VERSION")]
    pub version: i64,
}

// =============================================================================
// Create Command
// =============================================================================

/// Arguments for the `create` command
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Migration name, used after the version prefix
    pub name: String,

    /// Kind of migration to create
    #[arg(short = 't', long = "type", default_value = "sql")]
    pub kind: MigrationType,
}

/// Migration file types `create` can produce
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MigrationType {
    /// SQL script with Up/Down sections
    #[default]
    Sql,
    /// Rust source with `up()` / `down()` functions
    #[value(alias = "rust")]
    Rs,
}

impl From<MigrationType> for MigrationKind {
    fn from(kind: MigrationType) -> Self {
        match kind {
            MigrationType::Sql => MigrationKind::Sql,
            MigrationType::Rs => MigrationKind::Code,
        }
    }
}
