//! # tidemark-migrate
//!
//! Migration engine for Tidemark.
//!
//! This crate provides:
//! - Discovery of versioned migration files (`<version>_<name>.sql` / `.rs`)
//! - An append-only version ledger table, one row per apply or revert
//! - Resolution of the current version from a possibly inconsistent history
//! - Planning of the ordered work-list towards a target version
//! - Transactional application of SQL migrations and out-of-process code
//!   migrations
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │  Discovery   │────▶│ Ledger Reader  │────▶│   Planner   │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!                                                    │
//!                                                    ▼
//!                      ┌────────────────┐     ┌─────────────┐
//!                      │ Ledger Writer  │◀────│ Applicator  │
//!                      └────────────────┘     └─────────────┘
//! ```
//!
//! Drivers plug in through [`MigrationConnection`]; the SQL spoken to the
//! ledger table comes from a [`Dialect`] chosen by [`DialectKind`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use tidemark_migrate::{ConnectionConfig, DialectKind, MigrationConfig, MigrationEngine};
//!
//! async fn migrate(conn: &mut dyn tidemark_migrate::MigrationConnection)
//!     -> Result<(), Box<dyn std::error::Error>>
//! {
//!     let config = MigrationConfig::new()
//!         .migrations_dir("db/migrations")
//!         .connection(ConnectionConfig::new("sqlite3", "app.db", DialectKind::Sqlite));
//!
//!     let engine = MigrationEngine::new(config)?;
//!     let report = engine.up(conn).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Migration Files
//!
//! ```text
//! db/migrations/
//! ├── 20240101090000_create_users.sql
//! ├── 20240102120000_backfill_names.rs
//! └── 20240105083000_add_index.sql
//! ```
//!
//! SQL files carry an `Up` and a `Down` section:
//!
//! ```sql
//! -- +tidemark Up
//! CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
//!
//! -- +tidemark Down
//! DROP TABLE users;
//! ```
//!
//! Rust files define `pub fn up()` and `pub fn down()` and are run by a
//! [`CodeMigrationExecutor`].
//!
//! ## Concurrency
//!
//! A run is one linear pass. Nothing coordinates two runs against the same
//! database; callers that need that must serialize invocations themselves.

pub mod code;
pub mod connection;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod file;
pub mod history;
pub mod plan;
pub mod resolve;
pub mod sql;

// Re-exports
pub use code::{
    CargoExecutor, CodeMigrationExecutor, CodeMigrationOutcome, CodeMigrationRequest,
    CommandExecutor, ConnectionConfig,
};
pub use connection::{MigrationConnection, SqlParam, Statement};
pub use dialect::{
    DEFAULT_VERSION_TABLE, Dialect, DialectKind, GenericDialect, MySqlDialect, PostgresDialect,
    RedshiftDialect, SqliteDialect, dialect_for,
};
pub use engine::{MigrationConfig, MigrationEngine, MigrationReport, StatusEntry};
pub use error::{MigrateResult, MigrationError};
pub use file::{MigrationFileManager, MigrationKind, MigrationUnit, parse_migration_name};
pub use history::{LedgerRecord, VersionLedger};
pub use plan::{Direction, MigrationPlan, plan, plan_in_direction};
pub use resolve::{resolve_current_version, resolve_status};
pub use sql::SqlScript;
