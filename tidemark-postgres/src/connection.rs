//! PostgreSQL connection wrapper.

use chrono::{DateTime, NaiveDateTime, Utc};
use tidemark_migrate::{LedgerRecord, MigrateResult, MigrationConnection, SqlParam, Statement};
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, warn};

use crate::config::PgConfig;
use crate::error::{PgError, PgResult};

/// A single PostgreSQL (or Redshift) connection.
pub struct PgConnection {
    client: Client,
    driver: String,
    driver_task: JoinHandle<()>,
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}

impl PgConnection {
    /// Connect using a parsed configuration.
    pub async fn connect(config: &PgConfig) -> PgResult<Self> {
        let (client, connection) = config.to_pg_config().connect(NoTls).await?;

        let driver_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        if let Some(timeout) = config.statement_timeout {
            client
                .batch_execute(&format!("SET statement_timeout = {}", timeout.as_millis()))
                .await?;
        }

        debug!(host = %config.host, database = %config.database, "Connected to PostgreSQL");
        Ok(Self {
            client,
            driver: "postgres".to_string(),
            driver_task,
        })
    }

    /// Connect using a URL or `key=value` connection string.
    pub async fn connect_dsn(dsn: &str) -> PgResult<Self> {
        Self::connect(&PgConfig::from_dsn(dsn)?).await
    }

    /// Report a different driver name, e.g. `redshift`.
    pub fn with_driver_name(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    /// Get the inner client reference.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Close the connection and wait for the driver task to finish.
    pub async fn close(self) {
        drop(self.client);
        if let Err(e) = self.driver_task.await {
            warn!(error = %e, "PostgreSQL driver task failed");
        }
    }

    async fn transaction(&mut self, statements: &[Statement]) -> PgResult<()> {
        debug!(statements = statements.len(), "Executing transaction");
        let tx = self.client.transaction().await?;

        for (index, stmt) in statements.iter().enumerate() {
            let result = if stmt.params.is_empty() {
                tx.batch_execute(&stmt.sql).await
            } else {
                let params = to_params(&stmt.params);
                let refs: Vec<&(dyn ToSql + Sync)> = params
                    .iter()
                    .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                    .collect();
                tx.execute(stmt.sql.as_str(), &refs).await.map(|_| ())
            };

            if let Err(source) = result {
                if let Err(e) = tx.rollback().await {
                    warn!(error = %e, "Rollback failed");
                }
                return Err(PgError::Statement {
                    index: index + 1,
                    excerpt: stmt.excerpt(),
                    source,
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

fn to_params(params: &[SqlParam]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    params
        .iter()
        .map(|p| -> Box<dyn ToSql + Sync + Send> {
            match p {
                SqlParam::BigInt(v) => Box::new(*v),
                SqlParam::Bool(v) => Box::new(*v),
            }
        })
        .collect()
}

fn ledger_record(row: &Row) -> PgResult<LedgerRecord> {
    let id = match row.try_get::<_, i64>(0) {
        Ok(id) => id,
        Err(_) => i64::from(row.try_get::<_, i32>(0)?),
    };
    let version: i64 = row.try_get(1)?;
    let applied: bool = row.try_get(2)?;
    let timestamp = match row.try_get::<_, Option<NaiveDateTime>>(3) {
        Ok(ts) => ts,
        Err(_) => row
            .try_get::<_, Option<DateTime<Utc>>>(3)
            .map_err(|e| PgError::deserialization(format!("tstamp column: {}", e)))?
            .map(|dt| dt.naive_utc()),
    };
    Ok(LedgerRecord::new(id, version, applied, timestamp))
}

#[async_trait::async_trait]
impl MigrationConnection for PgConnection {
    fn driver_name(&self) -> &str {
        &self.driver
    }

    async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
        debug!(sql = %sql, "Executing batch");
        self.client.batch_execute(sql).await.map_err(PgError::from)?;
        Ok(())
    }

    async fn query_exists(&mut self, sql: &str) -> MigrateResult<bool> {
        let rows = self.client.query(sql, &[]).await.map_err(PgError::from)?;
        Ok(!rows.is_empty())
    }

    async fn query_ledger(&mut self, sql: &str) -> MigrateResult<Vec<LedgerRecord>> {
        debug!(sql = %sql, "Reading ledger");
        let rows = self.client.query(sql, &[]).await.map_err(PgError::from)?;
        let records = rows
            .iter()
            .map(ledger_record)
            .collect::<PgResult<Vec<_>>>()?;
        Ok(records)
    }

    async fn execute_transaction(&mut self, statements: &[Statement]) -> MigrateResult<()> {
        Ok(self.transaction(statements).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_params() {
        let params = to_params(&[SqlParam::BigInt(3), SqlParam::Bool(true)]);
        assert_eq!(params.len(), 2);
        assert_eq!(format!("{:?}", params[0]), "3");
        assert_eq!(format!("{:?}", params[1]), "true");
    }

    #[tokio::test]
    async fn test_connect_refused_is_database_error() {
        let config = PgConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            database: "none".to_string(),
            connect_timeout: std::time::Duration::from_secs(2),
            ..Default::default()
        };
        let err = PgConnection::connect(&config).await.unwrap_err();
        let err: tidemark_migrate::MigrationError = err.into();
        assert!(matches!(err, tidemark_migrate::MigrationError::Database(_)));
    }
}
