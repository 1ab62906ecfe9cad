//! Driver-neutral database capability consumed by the engine.
//!
//! Each driver crate implements [`MigrationConnection`] once. The engine only
//! ever borrows a connection for the duration of a run; opening and closing
//! it stays with the caller.

use std::fmt;

use crate::error::MigrateResult;
use crate::history::LedgerRecord;

/// A typed statement parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlParam {
    /// 64-bit integer.
    BigInt(i64),
    /// Boolean.
    Bool(bool),
}

impl fmt::Display for SqlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BigInt(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// A single SQL statement with its bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Statement text, using the dialect's placeholder syntax.
    pub sql: String,
    /// Positional parameters.
    pub params: Vec<SqlParam>,
}

impl Statement {
    /// Create a statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Create a statement with positional parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Short single-line excerpt for diagnostics.
    pub fn excerpt(&self) -> String {
        let flat: String = self.sql.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() > 80 {
            let cut: String = flat.chars().take(77).collect();
            format!("{}...", cut)
        } else {
            flat
        }
    }
}

/// An open database connection the engine can migrate.
#[async_trait::async_trait]
pub trait MigrationConnection: Send {
    /// Name of the driver behind this connection.
    fn driver_name(&self) -> &str;

    /// Execute a statement that takes no parameters.
    async fn execute(&mut self, sql: &str) -> MigrateResult<()>;

    /// Return whether the query yields at least one row.
    async fn query_exists(&mut self, sql: &str) -> MigrateResult<bool>;

    /// Run a history query whose columns are `(id, version_id, is_applied, tstamp)`.
    async fn query_ledger(&mut self, sql: &str) -> MigrateResult<Vec<LedgerRecord>>;

    /// Execute the statements in order inside one transaction.
    ///
    /// On the first failing statement the transaction is rolled back and
    /// nothing from `statements` becomes visible.
    async fn execute_transaction(&mut self, statements: &[Statement]) -> MigrateResult<()>;
}
