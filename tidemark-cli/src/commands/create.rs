//! `tidemark create` - write a new migration from a template.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tidemark_migrate::{MigrationFileManager, MigrationKind};

use crate::cli::CreateArgs;
use crate::config::{DbConf, MIGRATIONS_DIR, find_config};
use crate::error::{CliError, CliResult};
use crate::output;

/// Run `tidemark create <name>`
///
/// Needs no database. Without a config file or `DB_DRIVER`, the migration
/// lands in `<path>/migrations`.
pub async fn run(path: &Path, env: &str, args: CreateArgs) -> CliResult<()> {
    let dir = migrations_dir(path, env)?;
    let files = MigrationFileManager::new(&dir);

    let kind = MigrationKind::from(args.kind);
    let created = files.create_migration(&args.name, kind, Utc::now()).await?;

    output::success(&format!("Created {} migration", kind));
    output::kv("File", &created.display().to_string());
    Ok(())
}

fn migrations_dir(path: &Path, env: &str) -> CliResult<PathBuf> {
    match DbConf::load(path, env) {
        Ok(conf) => Ok(conf.migrations_dir),
        Err(CliError::Config(_)) if find_config(path)?.is_none() => Ok(path.join(MIGRATIONS_DIR)),
        Err(e) => Err(e),
    }
}
