//! `tidemark redo` - roll back the current version and apply it again.

use crate::config::DbConf;
use crate::error::CliResult;

/// Run `tidemark redo`
pub async fn run(conf: &DbConf) -> CliResult<()> {
    let engine = super::engine(conf)?;
    let mut conn = super::connect(conf).await?;

    let (down, up) = engine.redo(&mut *conn).await?;
    let units = engine.discover().await?;
    super::print_report(&down, &units);
    super::print_report(&up, &units);
    Ok(())
}
