//! CLI command implementations.

pub mod create;
pub mod dbversion;
pub mod down;
pub mod drivers;
pub mod redo;
pub mod status;
pub mod up;

use std::collections::BTreeMap;

use tidemark_migrate::{
    CargoExecutor, CommandExecutor, ConnectionConfig, MigrationConfig, MigrationConnection,
    MigrationEngine, MigrationReport, MigrationUnit,
};
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::config::DbConf;
use crate::error::{CliError, CliResult};
use crate::output;

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Command::Create(args) => create::run(&cli.path, &cli.env, args).await,
        Command::Drivers => drivers::run(),
        Command::Up => up::run(&load(&cli)?).await,
        Command::MigrateTo(ref args) => up::run_to(&load(&cli)?, args.version).await,
        Command::Down => down::run(&load(&cli)?).await,
        Command::Redo => redo::run(&load(&cli)?).await,
        Command::Status => status::run(&load(&cli)?).await,
        Command::Dbversion => dbversion::run(&load(&cli)?).await,
    }
}

fn load(cli: &Cli) -> CliResult<DbConf> {
    let conf = DbConf::load(&cli.path, &cli.env)?;
    debug!(
        env = %conf.env,
        driver = %conf.driver,
        dialect = %conf.dialect,
        migrations = %conf.migrations_dir.display(),
        "Loaded configuration"
    );
    Ok(conf)
}

/// Build the engine for an environment
pub fn engine(conf: &DbConf) -> CliResult<MigrationEngine> {
    let config = MigrationConfig::new()
        .migrations_dir(conf.migrations_dir.clone())
        .table_name(conf.table.clone())
        .connection(ConnectionConfig::new(
            conf.driver.clone(),
            conf.dsn.clone(),
            conf.dialect,
        ));

    let engine = MigrationEngine::new(config)?;
    let engine = match &conf.code_command {
        Some(argv) => engine
            .with_executor(CommandExecutor::from_argv(argv)?.working_dir(conf.base_dir.clone())),
        None => engine.with_executor(
            CargoExecutor::new().dependencies(conf.code_dependencies.iter().cloned()),
        ),
    };
    Ok(engine)
}

/// Open a connection for an environment's driver
pub async fn connect(conf: &DbConf) -> CliResult<Box<dyn MigrationConnection>> {
    match conf.driver.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite3" | "sqlite" => {
            let conn = tidemark_sqlite::SqliteConnection::open_url(&conf.dsn).await?;
            Ok(Box::new(conn))
        }
        #[cfg(feature = "postgres")]
        "postgres" | "postgresql" | "redshift" => {
            let conn = tidemark_postgres::PgConnection::connect_dsn(&conf.dsn)
                .await?
                .with_driver_name(conf.driver.clone());
            Ok(Box::new(conn))
        }
        other => Err(CliError::UnsupportedDriver(other.to_string())),
    }
}

/// Print what a run did, one line per migration
pub fn print_report(report: &MigrationReport, units: &[MigrationUnit]) {
    if report.is_empty() {
        output::info(&report.summary());
        return;
    }

    let names: BTreeMap<i64, String> = units
        .iter()
        .map(|u| (u.version, u.file_name()))
        .collect();

    for version in &report.applied {
        let name = names
            .get(version)
            .cloned()
            .unwrap_or_else(|| version.to_string());
        output::list_item(&format!("{} {}", output::style_success("OK"), name));
    }
    output::newline();
    output::success(&report.summary());
}
