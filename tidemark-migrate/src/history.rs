//! Version ledger reading and writing.
//!
//! The ledger is an append-only event log: every apply and every revert adds
//! one row, nothing is ever updated or deleted. [`VersionLedger`] binds a
//! dialect to a table name and turns the engine's needs into dialect calls.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::connection::{MigrationConnection, Statement};
use crate::dialect::{Dialect, validate_table_name};
use crate::error::{MigrateResult, MigrationError};
use crate::resolve::resolve_current_version;

/// One historical ledger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Insertion id; only used to order events.
    pub id: i64,
    /// Migration version the event refers to.
    pub version: i64,
    /// `true` if the event applied the migration, `false` if it reverted it.
    pub applied: bool,
    /// When the event was written, as recorded by the database.
    pub timestamp: Option<NaiveDateTime>,
}

impl LedgerRecord {
    /// Create a new ledger record.
    pub fn new(id: i64, version: i64, applied: bool, timestamp: Option<NaiveDateTime>) -> Self {
        Self {
            id,
            version,
            applied,
            timestamp,
        }
    }

    /// Recency key: timestamp first, insertion id as tie-break.
    pub fn recency(&self) -> (Option<NaiveDateTime>, i64) {
        (self.timestamp, self.id)
    }
}

/// Put records in newest-first insertion order.
///
/// The history query already orders by id; this makes the order hold for
/// records coming from anywhere else too.
pub fn sort_newest_first(records: &mut [LedgerRecord]) {
    records.sort_by(|a, b| b.id.cmp(&a.id));
}

/// Parse a textual ledger timestamp as written by the supported engines.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

/// The version ledger table as seen through one dialect.
#[derive(Debug)]
pub struct VersionLedger<'a> {
    dialect: &'a dyn Dialect,
    table: &'a str,
}

impl<'a> VersionLedger<'a> {
    /// Bind a dialect to a ledger table.
    pub fn new(dialect: &'a dyn Dialect, table: &'a str) -> MigrateResult<Self> {
        validate_table_name(table)?;
        Ok(Self { dialect, table })
    }

    /// Name of the ledger table.
    pub fn table(&self) -> &str {
        self.table
    }

    /// Read the history, newest first.
    ///
    /// Fails with [`MigrationError::TableDoesNotExist`] if the table is absent.
    pub async fn history(
        &self,
        conn: &mut dyn MigrationConnection,
    ) -> MigrateResult<Vec<LedgerRecord>> {
        let mut records = self.dialect.history(conn, self.table).await?;
        sort_newest_first(&mut records);
        debug!(table = %self.table, records = records.len(), "Read ledger history");
        Ok(records)
    }

    /// Read the history, treating a missing table as an empty history.
    pub async fn history_or_empty(
        &self,
        conn: &mut dyn MigrationConnection,
    ) -> MigrateResult<Vec<LedgerRecord>> {
        match self.history(conn).await {
            Err(MigrationError::TableDoesNotExist { .. }) => Ok(Vec::new()),
            other => other,
        }
    }

    /// Resolve the current version, creating the ledger if it does not exist.
    pub async fn ensure_version(&self, conn: &mut dyn MigrationConnection) -> MigrateResult<i64> {
        match self.history(conn).await {
            Ok(records) => resolve_current_version(&records),
            Err(MigrationError::TableDoesNotExist { read_error, .. }) => {
                self.create(conn).await.map_err(|e| match (e, read_error) {
                    (MigrationError::Database(msg), Some(read)) => MigrationError::database(
                        format!("{}; reading it first failed with: {}", msg, read),
                    ),
                    (e, _) => e,
                })?;
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Create the ledger table and seed it with an applied version 0.
    pub async fn create(&self, conn: &mut dyn MigrationConnection) -> MigrateResult<()> {
        info!(table = %self.table, "Creating version ledger table");

        let statements = [
            Statement::new(self.dialect.create_version_table_sql(self.table)),
            self.record_statement(0, true),
        ];
        conn.execute_transaction(&statements)
            .await
            .map_err(|e| MigrationError::database(format!("creating version table: {}", e)))
    }

    /// The insert writing one ledger event.
    pub fn record_statement(&self, version: i64, applied: bool) -> Statement {
        self.dialect.insert_record(self.table, version, applied)
    }

    /// Append one ledger event in its own transaction.
    pub async fn record(
        &self,
        conn: &mut dyn MigrationConnection,
        version: i64,
        applied: bool,
    ) -> MigrateResult<()> {
        conn.execute_transaction(&[self.record_statement(version, applied)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{GenericDialect, SqliteDialect};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    /// A connection on which every operation is refused.
    struct RefusingConnection;

    #[async_trait]
    impl MigrationConnection for RefusingConnection {
        fn driver_name(&self) -> &str {
            "refusing"
        }

        async fn execute(&mut self, _sql: &str) -> MigrateResult<()> {
            Err(MigrationError::database("permission denied"))
        }

        async fn query_exists(&mut self, _sql: &str) -> MigrateResult<bool> {
            Err(MigrationError::database("permission denied"))
        }

        async fn query_ledger(&mut self, _sql: &str) -> MigrateResult<Vec<LedgerRecord>> {
            Err(MigrationError::database("permission denied for table ledger"))
        }

        async fn execute_transaction(&mut self, _statements: &[Statement]) -> MigrateResult<()> {
            Err(MigrationError::database("permission denied for schema public"))
        }
    }

    #[tokio::test]
    async fn test_bootstrap_failure_keeps_read_error() {
        let dialect = GenericDialect;
        let ledger = VersionLedger::new(&dialect, "ledger").unwrap();

        let err = ledger.ensure_version(&mut RefusingConnection).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("creating version table"), "{msg}");
        assert!(msg.contains("permission denied for table ledger"), "{msg}");
    }

    #[tokio::test]
    async fn test_probe_failure_is_not_taken_as_missing_table() {
        let dialect = SqliteDialect;
        let ledger = VersionLedger::new(&dialect, "ledger").unwrap();

        let err = ledger.ensure_version(&mut RefusingConnection).await.unwrap_err();
        assert_eq!(err.to_string(), "Database error: permission denied");
    }

    #[test]
    fn test_sort_newest_first() {
        let mut records = vec![
            LedgerRecord::new(1, 0, true, None),
            LedgerRecord::new(3, 1, false, None),
            LedgerRecord::new(2, 1, true, None),
        ];
        sort_newest_first(&mut records);
        let ids: Vec<_> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(14, 5, 7, 250)
            .unwrap();
        assert_eq!(parse_timestamp("2024-03-09 14:05:07.250"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-09T14:05:07.250"), Some(expected));

        let whole = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap();
        assert_eq!(parse_timestamp("2024-03-09 14:05:07"), Some(whole));
        assert_eq!(parse_timestamp("2024-03-09T14:05:07Z"), Some(whole));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_recency_breaks_ties_by_id() {
        let ts = parse_timestamp("2024-03-09 14:05:07");
        let older = LedgerRecord::new(4, 1, true, ts);
        let newer = LedgerRecord::new(5, 1, false, ts);
        assert!(newer.recency() > older.recency());
    }

    #[test]
    fn test_ledger_rejects_bad_table_name() {
        let dialect = SqliteDialect;
        assert!(VersionLedger::new(&dialect, "bad name").is_err());

        let ledger = VersionLedger::new(&dialect, "ledger").unwrap();
        assert_eq!(ledger.table(), "ledger");
        let stmt = ledger.record_statement(3, true);
        assert!(stmt.sql.starts_with("INSERT INTO ledger"));
    }
}
