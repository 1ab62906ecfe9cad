//! # tidemark-postgres
//!
//! PostgreSQL driver for Tidemark migrations, built on `tokio-postgres`.
//!
//! The same connection serves Redshift, which speaks the PostgreSQL wire
//! protocol; pick the `redshift` dialect for its ledger table DDL.
//!
//! ```rust,ignore
//! use tidemark_postgres::PgConnection;
//!
//! let mut conn = PgConnection::connect_dsn("postgres://app@localhost/app").await?;
//! let report = engine.up(&mut conn).await?;
//! conn.close().await;
//! ```

pub mod config;
pub mod connection;
pub mod error;

pub use config::PgConfig;
pub use connection::PgConnection;
pub use error::{PgError, PgResult};
