//! `tidemark up` and `tidemark migrate-to` - apply pending migrations.

use tracing::info;

use crate::config::DbConf;
use crate::error::CliResult;

/// Run `tidemark up` - migrate to the most recent version on disk
pub async fn run(conf: &DbConf) -> CliResult<()> {
    let engine = super::engine(conf)?;
    let mut conn = super::connect(conf).await?;

    let report = engine.up(&mut *conn).await?;
    let units = engine.discover().await?;
    super::print_report(&report, &units);
    Ok(())
}

/// Run `tidemark migrate-to <version>` - migrate up or down to `version`
pub async fn run_to(conf: &DbConf, version: i64) -> CliResult<()> {
    let engine = super::engine(conf)?;
    let mut conn = super::connect(conf).await?;

    info!(version, "Migrating to explicit version");
    let report = engine.run(&mut *conn, version).await?;
    let units = engine.discover().await?;
    super::print_report(&report, &units);
    Ok(())
}
