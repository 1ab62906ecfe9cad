//! SQLite driver for Tidemark migrations.
//!
//! Wraps a `tokio-rusqlite` connection and implements
//! [`MigrationConnection`](tidemark_migrate::MigrationConnection) on it, so the
//! engine can read the version ledger and apply migrations transactionally.
//!
//! # Example
//!
//! ```rust,ignore
//! use tidemark_migrate::{ConnectionConfig, DialectKind, MigrationConfig, MigrationEngine};
//! use tidemark_sqlite::SqliteConnection;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = SqliteConnection::open_url("sqlite://./app.db").await?;
//!     let config = MigrationConfig::new()
//!         .migrations_dir("db/migrations")
//!         .connection(ConnectionConfig::new("sqlite3", "./app.db", DialectKind::Sqlite));
//!
//!     let report = MigrationEngine::new(config)?.up(&mut conn).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;

pub use config::{DatabasePath, SqliteConfig};
pub use connection::SqliteConnection;
pub use error::{SqliteError, SqliteResult};
