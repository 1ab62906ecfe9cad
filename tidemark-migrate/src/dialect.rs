//! SQL dialects for the version ledger table.
//!
//! A dialect knows three things about its engine: how to create the ledger
//! table, how to insert one ledger event, and how to read the event history
//! back (including how to tell that the table is not there yet). Dialects hold
//! no state; [`dialect_for`] hands out the one matching a [`DialectKind`].
//!
//! ```text
//! id | version_id | is_applied | tstamp
//! ---+------------+------------+--------------------
//!  1 |          0 | true       | 2024-01-01 10:00:00
//!  2 |          1 | true       | 2024-01-02 09:12:44
//!  3 |          1 | false      | 2024-01-02 09:15:02
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::{MigrationConnection, SqlParam, Statement};
use crate::error::{MigrateResult, MigrationError};
use crate::history::LedgerRecord;

/// Default name of the version ledger table.
pub const DEFAULT_VERSION_TABLE: &str = "tidemark_db_version";

/// The supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// Portable SQL; no engine-specific table probe.
    #[default]
    Generic,
    /// PostgreSQL.
    Postgres,
    /// Amazon Redshift (PostgreSQL wire protocol).
    Redshift,
    /// MySQL / MariaDB.
    #[serde(rename = "mysql")]
    MySql,
    /// SQLite 3.
    #[serde(rename = "sqlite3", alias = "sqlite")]
    Sqlite,
}

impl DialectKind {
    /// All dialects, in display order.
    pub const ALL: [DialectKind; 5] = [
        DialectKind::Generic,
        DialectKind::Postgres,
        DialectKind::Redshift,
        DialectKind::MySql,
        DialectKind::Sqlite,
    ];

    /// Canonical configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Postgres => "postgres",
            Self::Redshift => "redshift",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite3",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generic" | "sql" => Ok(Self::Generic),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "redshift" => Ok(Self::Redshift),
            "mysql" | "mymysql" => Ok(Self::MySql),
            "sqlite3" | "sqlite" => Ok(Self::Sqlite),
            other => Err(MigrationError::UnknownDialect(other.to_string())),
        }
    }
}

/// Per-engine strategy for the version ledger table.
#[async_trait::async_trait]
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Which dialect this is.
    fn kind(&self) -> DialectKind;

    /// DDL creating the ledger table `(id, version_id, is_applied, tstamp)`.
    fn create_version_table_sql(&self, table: &str) -> String;

    /// Parameterized insert of `(version_id, is_applied)`; `tstamp` is left
    /// to the column default.
    fn insert_version_sql(&self, table: &str) -> String;

    /// History query, most recent insert first.
    fn history_sql(&self, table: &str) -> String {
        format!("SELECT id, version_id, is_applied, tstamp FROM {table} ORDER BY id DESC")
    }

    /// Query returning a row iff the ledger table exists.
    ///
    /// `None` means the engine has no catalog probe and a failing history
    /// query is taken as the table being absent.
    fn version_table_exists_sql(&self, _table: &str) -> Option<String> {
        None
    }

    /// Ready-to-run insert of one ledger event.
    fn insert_record(&self, table: &str, version: i64, applied: bool) -> Statement {
        Statement::with_params(
            self.insert_version_sql(table),
            vec![SqlParam::BigInt(version), SqlParam::Bool(applied)],
        )
    }

    /// Read the full ledger history, newest first.
    ///
    /// Fails with [`MigrationError::TableDoesNotExist`] when the ledger
    /// table is absent.
    async fn history(
        &self,
        conn: &mut dyn MigrationConnection,
        table: &str,
    ) -> MigrateResult<Vec<LedgerRecord>> {
        let query = self.history_sql(table);

        match self.version_table_exists_sql(table) {
            Some(probe) => {
                if !conn.query_exists(&probe).await? {
                    return Err(MigrationError::TableDoesNotExist {
                        table: table.to_string(),
                        read_error: None,
                    });
                }
                conn.query_ledger(&query).await
            }
            None => match conn.query_ledger(&query).await {
                Err(MigrationError::Database(msg)) => {
                    debug!(table = %table, error = %msg, "history query failed, assuming no ledger");
                    Err(MigrationError::TableDoesNotExist {
                        table: table.to_string(),
                        read_error: Some(msg),
                    })
                }
                other => other,
            },
        }
    }
}

/// Portable SQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDialect;

impl Dialect for GenericDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Generic
    }

    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {table} (\n\
             \x20   id INTEGER GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY,\n\
             \x20   version_id BIGINT NOT NULL,\n\
             \x20   is_applied BOOLEAN NOT NULL,\n\
             \x20   tstamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n\
             )"
        )
    }

    fn insert_version_sql(&self, table: &str) -> String {
        format!("INSERT INTO {table} (version_id, is_applied) VALUES (?, ?)")
    }
}

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {table} (\n\
             \x20   id serial NOT NULL,\n\
             \x20   version_id bigint NOT NULL,\n\
             \x20   is_applied boolean NOT NULL,\n\
             \x20   tstamp timestamp NULL default now(),\n\
             \x20   PRIMARY KEY(id)\n\
             )"
        )
    }

    fn insert_version_sql(&self, table: &str) -> String {
        format!("INSERT INTO {table} (version_id, is_applied) VALUES ($1, $2)")
    }

    // Unquoted identifiers are folded to lower case by the server.
    fn version_table_exists_sql(&self, table: &str) -> Option<String> {
        Some(format!(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = '{}'",
            table.to_ascii_lowercase()
        ))
    }
}

/// Amazon Redshift.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedshiftDialect;

impl Dialect for RedshiftDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Redshift
    }

    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {table} (\n\
             \x20   id integer NOT NULL identity(1, 1),\n\
             \x20   version_id bigint NOT NULL,\n\
             \x20   is_applied boolean NOT NULL,\n\
             \x20   tstamp timestamp NULL default sysdate,\n\
             \x20   PRIMARY KEY(id)\n\
             )"
        )
    }

    fn insert_version_sql(&self, table: &str) -> String {
        PostgresDialect.insert_version_sql(table)
    }

    // pg_table_def only lists tables on the search_path, which is where the
    // ledger is created. Names are stored folded to lower case.
    fn version_table_exists_sql(&self, table: &str) -> Option<String> {
        Some(format!(
            "SELECT 1 FROM pg_table_def WHERE tablename = '{}' LIMIT 1",
            table.to_ascii_lowercase()
        ))
    }
}

/// MySQL / MariaDB.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {table} (\n\
             \x20   id serial NOT NULL,\n\
             \x20   version_id bigint NOT NULL,\n\
             \x20   is_applied boolean NOT NULL,\n\
             \x20   tstamp timestamp NULL default now(),\n\
             \x20   PRIMARY KEY(id)\n\
             )"
        )
    }

    fn insert_version_sql(&self, table: &str) -> String {
        GenericDialect.insert_version_sql(table)
    }

    fn version_table_exists_sql(&self, table: &str) -> Option<String> {
        Some(format!(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = '{table}'"
        ))
    }
}

/// SQLite 3.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    // Millisecond timestamps keep apply/revert pairs within one second ordered.
    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE {table} (\n\
             \x20   id INTEGER PRIMARY KEY AUTOINCREMENT,\n\
             \x20   version_id INTEGER NOT NULL,\n\
             \x20   is_applied INTEGER NOT NULL,\n\
             \x20   tstamp TIMESTAMP DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))\n\
             )"
        )
    }

    fn insert_version_sql(&self, table: &str) -> String {
        GenericDialect.insert_version_sql(table)
    }

    fn version_table_exists_sql(&self, table: &str) -> Option<String> {
        Some(format!(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '{table}'"
        ))
    }
}

/// Select the dialect strategy for a configured kind.
pub fn dialect_for(kind: DialectKind) -> Box<dyn Dialect> {
    match kind {
        DialectKind::Generic => Box::new(GenericDialect),
        DialectKind::Postgres => Box::new(PostgresDialect),
        DialectKind::Redshift => Box::new(RedshiftDialect),
        DialectKind::MySql => Box::new(MySqlDialect),
        DialectKind::Sqlite => Box::new(SqliteDialect),
    }
}

/// Check that a ledger table name is a plain SQL identifier.
pub fn validate_table_name(table: &str) -> MigrateResult<()> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(MigrationError::config(format!(
            "invalid version table name '{}': expected a plain identifier",
            table
        )))
    }
}
