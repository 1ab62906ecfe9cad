//! # Tidemark
//!
//! Versioned schema migrations for SQL databases.
//!
//! Tidemark provides:
//! - Migrations as `<version>_<name>.sql` scripts or `<version>_<name>.rs` programs
//! - An append-only version ledger table recording every apply and revert
//! - Recovery of the current version from an inconsistent ledger, including
//!   picking up migrations that were added below the current version
//! - One transaction per SQL migration, covering its statements and its
//!   ledger row
//! - Drivers for SQLite and PostgreSQL / Redshift
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tidemark::prelude::*;
//! use tidemark::sqlite::SqliteConnection;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = SqliteConnection::open_url("sqlite://./app.db").await?;
//!
//!     let engine = MigrationEngine::new(
//!         MigrationConfig::new()
//!             .migrations_dir("db/migrations")
//!             .connection(ConnectionConfig::new("sqlite3", "./app.db", DialectKind::Sqlite)),
//!     )?;
//!
//!     let report = engine.up(&mut conn).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The migration engine, dialects and file handling.
pub mod migrate {
    pub use tidemark_migrate::*;
}

/// SQLite driver.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite {
    pub use tidemark_sqlite::*;
}

/// PostgreSQL and Redshift driver.
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres {
    pub use tidemark_postgres::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tidemark_migrate::{
        ConnectionConfig, DialectKind, Direction, MigrateResult, MigrationConfig,
        MigrationConnection, MigrationEngine, MigrationError, MigrationReport, StatusEntry,
    };
}

// Re-export key types at the crate root
pub use tidemark_migrate::{MigrateResult, MigrationEngine, MigrationError};
