//! Migration engine implementation.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::code::{CargoExecutor, CodeMigrationExecutor, CodeMigrationRequest, ConnectionConfig};
use crate::connection::{MigrationConnection, Statement};
use crate::dialect::{DEFAULT_VERSION_TABLE, Dialect, dialect_for, validate_table_name};
use crate::error::{MigrateResult, MigrationError};
use crate::file::{MigrationFileManager, MigrationKind, MigrationUnit, previous_version_in};
use crate::history::{LedgerRecord, VersionLedger};
use crate::plan::{Direction, MigrationPlan, plan, plan_in_direction};
use crate::resolve::{latest_events, resolve_status};
use crate::sql::SqlScript;

/// Configuration for the migration engine.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Path to the migrations directory.
    pub migrations_dir: PathBuf,
    /// Name of the version ledger table.
    pub table_name: String,
    /// Target database, also handed to code migrations.
    pub connection: ConnectionConfig,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("db/migrations"),
            table_name: DEFAULT_VERSION_TABLE.to_string(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl MigrationConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Set the ledger table name.
    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.table_name = table.into();
        self
    }

    /// Set the target database.
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }
}

/// One row of `status` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    /// Migration version.
    pub version: i64,
    /// Migration file.
    pub source: PathBuf,
    /// How the migration runs.
    pub kind: MigrationKind,
    /// Whether its most recent ledger event applied it.
    pub applied: bool,
    /// When it was applied, if it currently is.
    pub applied_at: Option<NaiveDateTime>,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version before the run.
    pub from: i64,
    /// Requested version.
    pub target: i64,
    /// Direction of the run.
    pub direction: Direction,
    /// Versions that ran, in execution order.
    pub applied: Vec<i64>,
    /// Wall-clock time spent.
    pub duration: Duration,
}

impl MigrationReport {
    /// Whether nothing had to be done.
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    /// Get a summary of the report.
    pub fn summary(&self) -> String {
        if self.applied.is_empty() {
            return format!("No migrations to run, database is at version {}", self.from);
        }

        let verb = match self.direction {
            Direction::Up => "applied",
            Direction::Down => "rolled back",
        };
        format!(
            "{} {} in {}ms ({} -> {})",
            self.applied.len(),
            verb,
            self.duration.as_millis(),
            self.from,
            self.target
        )
    }
}

/// The migration engine.
///
/// Holds no database state between calls: every operation re-reads the
/// migrations directory and the ledger.
#[derive(Debug)]
pub struct MigrationEngine {
    config: MigrationConfig,
    files: MigrationFileManager,
    dialect: Box<dyn Dialect>,
    executor: Box<dyn CodeMigrationExecutor>,
}

impl MigrationEngine {
    /// Create a new engine with the default code migration executor.
    pub fn new(config: MigrationConfig) -> MigrateResult<Self> {
        validate_table_name(&config.table_name)?;

        Ok(Self {
            files: MigrationFileManager::new(config.migrations_dir.clone()),
            dialect: dialect_for(config.connection.dialect),
            executor: Box::new(CargoExecutor::new()),
            config,
        })
    }

    /// Use a different executor for code migrations.
    pub fn with_executor(mut self, executor: impl CodeMigrationExecutor + 'static) -> Self {
        self.executor = Box::new(executor);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Get the file manager.
    pub fn files(&self) -> &MigrationFileManager {
        &self.files
    }

    /// Get the dialect in use.
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    fn ledger(&self) -> MigrateResult<VersionLedger<'_>> {
        VersionLedger::new(self.dialect.as_ref(), &self.config.table_name)
    }

    /// Resolve the current version, creating the ledger on first use.
    pub async fn ensure_version(&self, conn: &mut dyn MigrationConnection) -> MigrateResult<i64> {
        self.ledger()?.ensure_version(conn).await
    }

    /// Ledger events, newest first. Empty when the ledger does not exist.
    pub async fn history(
        &self,
        conn: &mut dyn MigrationConnection,
    ) -> MigrateResult<Vec<LedgerRecord>> {
        self.ledger()?.history_or_empty(conn).await
    }

    /// Discover the migrations on disk.
    pub async fn discover(&self) -> MigrateResult<Vec<MigrationUnit>> {
        self.files.discover().await
    }

    /// Applied state of every migration on disk.
    pub async fn status(&self, conn: &mut dyn MigrationConnection) -> MigrateResult<Vec<StatusEntry>> {
        let units = self.discover().await?;
        let ledger = self.ledger()?;
        ledger.ensure_version(conn).await?;
        let history = ledger.history(conn).await?;

        let latest = latest_events(&units, &history);
        Ok(units
            .iter()
            .map(|unit| {
                let event = latest.get(&unit.version).copied().flatten();
                let applied = event.is_some_and(|r| r.applied);
                StatusEntry {
                    version: unit.version,
                    source: unit.path.clone(),
                    kind: unit.kind,
                    applied,
                    applied_at: event.filter(|r| r.applied).and_then(|r| r.timestamp),
                }
            })
            .collect())
    }

    /// Migrate to `target`.
    ///
    /// Units that already committed stay applied when a later one fails; the
    /// error names the failing unit.
    pub async fn run(
        &self,
        conn: &mut dyn MigrationConnection,
        target: i64,
    ) -> MigrateResult<MigrationReport> {
        let start = Instant::now();

        let units = self.discover().await?;
        let ledger = self.ledger()?;
        let current = ledger.ensure_version(conn).await?;
        let history = ledger.history(conn).await?;
        let status = resolve_status(&units, &history);

        let plan = plan(&units, current, target, &status);
        debug!(
            current,
            target,
            direction = %plan.direction,
            versions = ?plan.versions(),
            "Planned migration run"
        );

        if plan.is_empty() {
            info!(current, target, "No migrations to run");
        } else {
            info!(
                current,
                target,
                direction = %plan.direction,
                count = plan.len(),
                "Running migrations"
            );
        }

        let applied = self.apply(&plan, conn).await?;

        Ok(MigrationReport {
            from: current,
            target,
            direction: plan.direction,
            applied,
            duration: start.elapsed(),
        })
    }

    /// Migrate to the most recent version on disk.
    pub async fn up(&self, conn: &mut dyn MigrationConnection) -> MigrateResult<MigrationReport> {
        let target = self.files.most_recent_version().await?;
        self.run(conn, target).await
    }

    /// Roll back the current version only.
    pub async fn rollback(
        &self,
        conn: &mut dyn MigrationConnection,
    ) -> MigrateResult<MigrationReport> {
        let start = Instant::now();

        let units = self.discover().await?;
        let ledger = self.ledger()?;
        let current = ledger.ensure_version(conn).await?;
        if current == 0 {
            return Err(MigrationError::NoPreviousVersion(current));
        }
        let previous = previous_version_in(&units, current)?;

        let history = ledger.history(conn).await?;
        let status = resolve_status(&units, &history);

        let mut plan = plan_in_direction(&units, Direction::Down, current, previous, &status);
        plan.units.retain(|u| u.version == current);

        if plan.is_empty() {
            return Err(MigrationError::invalid_migration(format!(
                "current version {} has no applied migration file in {}",
                current,
                self.files.migrations_dir().display()
            )));
        }

        info!(current, previous, "Rolling back current version");
        let applied = self.apply(&plan, conn).await?;

        Ok(MigrationReport {
            from: current,
            target: previous,
            direction: Direction::Down,
            applied,
            duration: start.elapsed(),
        })
    }

    /// Roll back the current version and apply it again.
    pub async fn redo(
        &self,
        conn: &mut dyn MigrationConnection,
    ) -> MigrateResult<(MigrationReport, MigrationReport)> {
        let down = self.rollback(conn).await?;
        let up = self.run(conn, down.from).await?;
        Ok((down, up))
    }

    /// Run a plan, stopping at the first failing unit.
    ///
    /// Returns the versions that ran. Each unit commits on its own, so units
    /// before a failure remain applied.
    pub async fn apply(
        &self,
        plan: &MigrationPlan<'_>,
        conn: &mut dyn MigrationConnection,
    ) -> MigrateResult<Vec<i64>> {
        let ledger = self.ledger()?;
        let mut applied = Vec::with_capacity(plan.len());

        for unit in &plan.units {
            let started = Instant::now();
            let result = match unit.kind {
                MigrationKind::Sql => self.apply_sql(&ledger, unit, plan.direction, conn).await,
                MigrationKind::Code => self.apply_code(&ledger, unit, plan.direction, conn).await,
            };

            if let Err(e) = result {
                warn!(
                    version = unit.version,
                    file = %unit.file_name(),
                    direction = %plan.direction,
                    error = %e,
                    "Migration failed"
                );
                return Err(MigrationError::migration_failed(unit.version, &unit.path, e));
            }

            info!(
                version = unit.version,
                file = %unit.file_name(),
                direction = %plan.direction,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "OK"
            );
            applied.push(unit.version);
        }

        Ok(applied)
    }

    async fn apply_sql(
        &self,
        ledger: &VersionLedger<'_>,
        unit: &MigrationUnit,
        direction: Direction,
        conn: &mut dyn MigrationConnection,
    ) -> MigrateResult<()> {
        let mut statements = read_sql_statements(&unit.path, direction).await?;
        debug!(
            version = unit.version,
            statements = statements.len(),
            "Executing SQL migration"
        );
        statements.push(ledger.record_statement(unit.version, direction.applied_flag()));
        conn.execute_transaction(&statements).await
    }

    async fn apply_code(
        &self,
        ledger: &VersionLedger<'_>,
        unit: &MigrationUnit,
        direction: Direction,
        conn: &mut dyn MigrationConnection,
    ) -> MigrateResult<()> {
        let request = CodeMigrationRequest {
            version: unit.version,
            direction,
            source: &unit.path,
            connection: &self.config.connection,
        };
        let outcome = self.executor.execute(&request).await?;
        if !outcome.success() {
            return Err(MigrationError::code_migration(outcome.failure_message()));
        }
        for line in outcome.stdout.lines() {
            debug!(version = unit.version, "{}", line);
        }
        ledger
            .record(conn, unit.version, direction.applied_flag())
            .await
    }
}

async fn read_sql_statements(path: &Path, direction: Direction) -> MigrateResult<Vec<Statement>> {
    let content = tokio::fs::read_to_string(path).await?;
    let script = SqlScript::parse(&content)?;
    Ok(script
        .into_statements(direction)
        .into_iter()
        .map(Statement::new)
        .collect())
}
