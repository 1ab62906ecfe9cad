//! Error types for the migration engine.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed discovery input or configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two migration files resolve to the same version.
    #[error(
        "more than one file specifies the migration for version {version} ({} and {})",
        first.display(),
        second.display()
    )]
    DuplicateVersion {
        /// The conflicting version.
        version: i64,
        /// The file discovered first.
        first: PathBuf,
        /// The file discovered second.
        second: PathBuf,
    },

    /// The version ledger table does not exist yet.
    ///
    /// Consumed by the engine to bootstrap the ledger; never surfaced from
    /// [`MigrationEngine::run`](crate::engine::MigrationEngine::run).
    #[error("version table '{table}' does not exist")]
    TableDoesNotExist {
        /// Ledger table name.
        table: String,
        /// Driver error from the failed history query, when absence was
        /// inferred from it rather than from a catalog lookup.
        read_error: Option<String>,
    },

    /// The ledger holds no applied record at all.
    #[error("version ledger is corrupt: {0}")]
    LedgerCorrupt(String),

    /// A migration unit failed; the run stopped at this unit.
    #[error("migration {version} ({}) failed", source_path.display())]
    MigrationFailed {
        /// Version of the failing unit.
        version: i64,
        /// Path of the failing unit.
        source_path: PathBuf,
        /// Underlying failure.
        #[source]
        cause: Box<MigrationError>,
    },

    /// A rollback was requested but no earlier version exists.
    #[error("no previous version found before {0}")]
    NoPreviousVersion(i64),

    /// The migrations directory holds no migration files.
    #[error("no valid migration version found in {}", .0.display())]
    NoMigrations(PathBuf),

    /// Database driver error.
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid migration file content.
    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    /// An out-of-process code migration exited unsuccessfully.
    #[error("code migration failed: {0}")]
    CodeMigration(String),

    /// A dialect name that no dialect answers to.
    #[error("unknown SQL dialect '{0}'")]
    UnknownDialect(String),
}

impl MigrationError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create an invalid migration error.
    pub fn invalid_migration(msg: impl Into<String>) -> Self {
        Self::InvalidMigration(msg.into())
    }

    /// Create a code migration error.
    pub fn code_migration(msg: impl Into<String>) -> Self {
        Self::CodeMigration(msg.into())
    }

    /// Wrap a unit failure with the unit's identity.
    pub fn migration_failed(
        version: i64,
        source_path: impl Into<PathBuf>,
        cause: MigrationError,
    ) -> Self {
        Self::MigrationFailed {
            version,
            source_path: source_path.into(),
            cause: Box::new(cause),
        }
    }

    /// Check if this error is a configuration error raised before any
    /// database interaction.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::DuplicateVersion { .. } | Self::UnknownDialect(_)
        )
    }

    /// Version of the failing unit, if this error stopped a run.
    pub fn failed_version(&self) -> Option<i64> {
        match self {
            Self::MigrationFailed { version, .. } => Some(*version),
            _ => None,
        }
    }
}
