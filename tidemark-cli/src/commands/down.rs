//! `tidemark down` - roll back the current version.

use crate::config::DbConf;
use crate::error::CliResult;

/// Run `tidemark down`
pub async fn run(conf: &DbConf) -> CliResult<()> {
    let engine = super::engine(conf)?;
    let mut conn = super::connect(conf).await?;

    let report = engine.rollback(&mut *conn).await?;
    let units = engine.discover().await?;
    super::print_report(&report, &units);
    Ok(())
}
