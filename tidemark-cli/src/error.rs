//! CLI error types and result alias.

use miette::Diagnostic;
use thiserror::Error;
use tidemark_migrate::MigrationError;

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// IO error
    #[error("IO error")]
    #[diagnostic(code(tidemark::io))]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(tidemark::config),
        help("check dbconf.toml or the DB_DRIVER / DB_DSN environment variables")
    )]
    Config(String),

    /// The configured driver is not compiled into this binary
    #[error("Driver '{0}' is not available in this build")]
    #[diagnostic(
        code(tidemark::driver),
        help("run `tidemark drivers` to list the drivers this binary supports")
    )]
    UnsupportedDriver(String),

    /// Migration engine error
    #[error("Migration error")]
    #[diagnostic(code(tidemark::migration))]
    Migration(#[from] MigrationError),
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::Config(format!("Failed to parse TOML: {}", err))
    }
}

#[cfg(feature = "sqlite")]
impl From<tidemark_sqlite::SqliteError> for CliError {
    fn from(err: tidemark_sqlite::SqliteError) -> Self {
        CliError::Migration(err.into())
    }
}

#[cfg(feature = "postgres")]
impl From<tidemark_postgres::PgError> for CliError {
    fn from(err: tidemark_postgres::PgError) -> Self {
        CliError::Migration(err.into())
    }
}
