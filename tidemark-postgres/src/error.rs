//! Error types for PostgreSQL operations.

use thiserror::Error;
use tidemark_migrate::MigrationError;

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors that can occur during PostgreSQL operations.
#[derive(Error, Debug)]
pub enum PgError {
    /// PostgreSQL error.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// A statement inside a transaction failed; the transaction was rolled back.
    #[error("statement {index} failed ({excerpt}): {source}")]
    Statement {
        /// One-based position of the statement in the transaction.
        index: usize,
        /// Excerpt of the failing statement.
        excerpt: String,
        /// Driver error.
        #[source]
        source: tokio_postgres::Error,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Row deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl PgError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization(message.into())
    }

    /// SQLSTATE of the underlying server error, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Postgres(e) | Self::Statement { source: e, .. } => {
                e.code().map(|c| c.code())
            }
            _ => None,
        }
    }
}

impl From<PgError> for MigrationError {
    fn from(err: PgError) -> Self {
        match err {
            PgError::Config(msg) => MigrationError::config(msg),
            other => {
                let message = match other.code() {
                    Some(code) => format!("{} (SQLSTATE {})", other, code),
                    None => other.to_string(),
                };
                MigrationError::database(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PgError::config("invalid URL");
        assert!(matches!(err, PgError::Config(_)));
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_into_migration_error() {
        let err: MigrationError = PgError::config("missing host").into();
        assert!(err.is_config_error());

        let err: MigrationError = PgError::deserialization("bad id column").into();
        match err {
            MigrationError::Database(msg) => assert!(msg.contains("bad id column")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
