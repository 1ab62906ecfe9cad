//! SQLite connection wrapper.

use rusqlite::types::{Value, ValueRef};
use tidemark_migrate::history::parse_timestamp;
use tidemark_migrate::{LedgerRecord, MigrateResult, MigrationConnection, SqlParam, Statement};
use tokio_rusqlite::Connection;
use tracing::{debug, trace};

use crate::config::{DatabasePath, SqliteConfig};
use crate::error::{SqliteError, SqliteResult};

/// A single SQLite connection the migration engine can drive.
pub struct SqliteConnection {
    conn: Connection,
    config: SqliteConfig,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Open a database described by `config`.
    pub async fn open(config: SqliteConfig) -> SqliteResult<Self> {
        let conn = match &config.path {
            DatabasePath::Memory => Connection::open_in_memory().await?,
            DatabasePath::File(path) => Connection::open(path).await?,
        };

        let pragmas = config.pragmas();
        conn.call(move |conn| Ok(conn.execute_batch(&pragmas)?))
            .await?;

        debug!(path = ?config.path, "Opened SQLite database");
        Ok(Self { conn, config })
    }

    /// Open a database from a connection string.
    pub async fn open_url(url: &str) -> SqliteResult<Self> {
        Self::open(SqliteConfig::from_url(url)?).await
    }

    /// Open a fresh in-memory database.
    pub async fn open_in_memory() -> SqliteResult<Self> {
        Self::open(SqliteConfig::memory()).await
    }

    /// Get the configuration this connection was opened with.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Get the inner connection reference.
    pub fn inner(&self) -> &Connection {
        &self.conn
    }

    /// Execute one or more statements without parameters.
    pub async fn execute_batch(&self, sql: &str) -> SqliteResult<()> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing batch");

        self.conn
            .call(move |conn| Ok(conn.execute_batch(&sql)?))
            .await
            .map_err(SqliteError::from)
    }

    /// Query a single integer.
    pub async fn query_i64(&self, sql: &str) -> SqliteResult<i64> {
        let sql = sql.to_string();
        trace!(sql = %sql, "Querying scalar");

        self.conn
            .call(move |conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
            .await
            .map_err(SqliteError::from)
    }

    /// Query the first column of every row as text.
    pub async fn query_strings(&self, sql: &str) -> SqliteResult<Vec<String>> {
        let sql = sql.to_string();
        trace!(sql = %sql, "Querying column");

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let results: Result<Vec<_>, _> = rows.collect();
                Ok(results?)
            })
            .await
            .map_err(SqliteError::from)
    }

    /// Check whether a table exists.
    pub async fn table_exists(&self, name: &str) -> SqliteResult<bool> {
        let name = name.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
                Ok(stmt.exists([name])?)
            })
            .await
            .map_err(SqliteError::from)
    }

    /// Close the connection.
    pub async fn close(self) -> SqliteResult<()> {
        self.conn.close().await.map_err(SqliteError::from)
    }

    async fn transaction(&self, statements: &[Statement]) -> SqliteResult<()> {
        let owned = statements.to_vec();
        debug!(statements = owned.len(), "Executing transaction");

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (index, stmt) in owned.iter().enumerate() {
                    let result = if stmt.params.is_empty() {
                        tx.execute_batch(&stmt.sql)
                    } else {
                        let values: Vec<Value> = stmt.params.iter().map(to_value).collect();
                        tx.execute(&stmt.sql, rusqlite::params_from_iter(values.iter()))
                            .map(|_| ())
                    };
                    if let Err(e) = result {
                        // Dropping the transaction rolls it back.
                        return Ok(Err((index, e)));
                    }
                }
                tx.commit()?;
                Ok(Ok(()))
            })
            .await?;

        outcome.map_err(|(index, source)| SqliteError::Statement {
            index: index + 1,
            excerpt: statements[index].excerpt(),
            source,
        })
    }
}

fn to_value(param: &SqlParam) -> Value {
    match param {
        SqlParam::BigInt(v) => Value::Integer(*v),
        SqlParam::Bool(v) => Value::Integer(i64::from(*v)),
    }
}

#[async_trait::async_trait]
impl MigrationConnection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite3"
    }

    async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
        Ok(self.execute_batch(sql).await?)
    }

    async fn query_exists(&mut self, sql: &str) -> MigrateResult<bool> {
        let sql = sql.to_string();
        trace!(sql = %sql, "Probing");

        let exists = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                Ok(stmt.exists([])?)
            })
            .await
            .map_err(SqliteError::from)?;
        Ok(exists)
    }

    async fn query_ledger(&mut self, sql: &str) -> MigrateResult<Vec<LedgerRecord>> {
        let sql = sql.to_string();
        debug!(sql = %sql, "Reading ledger");

        let records = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], |row| {
                    let timestamp = match row.get_ref(3)? {
                        ValueRef::Text(text) => parse_timestamp(&String::from_utf8_lossy(text)),
                        _ => None,
                    };
                    Ok(LedgerRecord::new(
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        timestamp,
                    ))
                })?;
                let results: Result<Vec<_>, _> = rows.collect();
                Ok(results?)
            })
            .await
            .map_err(SqliteError::from)?;
        Ok(records)
    }

    async fn execute_transaction(&mut self, statements: &[Statement]) -> MigrateResult<()> {
        Ok(self.transaction(statements).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tidemark_migrate::{SqliteDialect, VersionLedger};

    #[tokio::test]
    async fn test_transaction_commits() {
        let mut conn = SqliteConnection::open_in_memory().await.unwrap();
        conn.execute_transaction(&[
            Statement::new("CREATE TABLE t (v TEXT);"),
            Statement::new("INSERT INTO t (v) VALUES ('a');"),
        ])
        .await
        .unwrap();

        assert_eq!(conn.query_strings("SELECT v FROM t").await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_failure() {
        let mut conn = SqliteConnection::open_in_memory().await.unwrap();
        conn.execute("CREATE TABLE t (v TEXT)").await.unwrap();

        let err = conn
            .execute_transaction(&[
                Statement::new("INSERT INTO t (v) VALUES ('a');"),
                Statement::new("INSERT INTO missing (v) VALUES ('b');"),
            ])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("statement 2"));
        assert!(err.to_string().contains("missing"));
        assert_eq!(conn.query_i64("SELECT COUNT(*) FROM t").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ledger_round_trip() {
        let mut conn = SqliteConnection::open_in_memory().await.unwrap();
        let dialect = SqliteDialect;
        let ledger = VersionLedger::new(&dialect, "tidemark_db_version").unwrap();

        assert_eq!(ledger.ensure_version(&mut conn).await.unwrap(), 0);
        assert!(conn.table_exists("tidemark_db_version").await.unwrap());

        ledger.record(&mut conn, 1, true).await.unwrap();
        ledger.record(&mut conn, 2, true).await.unwrap();
        ledger.record(&mut conn, 2, false).await.unwrap();

        let history = ledger.history(&mut conn).await.unwrap();
        let events: Vec<_> = history.iter().map(|r| (r.version, r.applied)).collect();
        assert_eq!(events, vec![(2, false), (2, true), (1, true), (0, true)]);
        assert!(history.iter().all(|r| r.timestamp.is_some()));

        assert_eq!(ledger.ensure_version(&mut conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_exists() {
        let mut conn = SqliteConnection::open_in_memory().await.unwrap();
        assert!(!conn
            .query_exists("SELECT 1 FROM sqlite_master WHERE name = 'nope'")
            .await
            .unwrap());
        assert!(conn.query_exists("SELECT 1").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("app.db");
        let url = format!("sqlite://{}", path.display());

        let conn = SqliteConnection::open_url(&url).await.unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT);").await.unwrap();
        conn.close().await.unwrap();

        let conn = SqliteConnection::open_url(&url).await.unwrap();
        assert!(conn.table_exists("t").await.unwrap());
        assert_eq!(conn.driver_name(), "sqlite3");
    }
}
