//! Tidemark CLI - command-line interface for Tidemark migrations.
//!
//! This crate provides the `tidemark` binary: configuration loading from
//! `dbconf.toml`, connector selection per driver and the migration commands.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
