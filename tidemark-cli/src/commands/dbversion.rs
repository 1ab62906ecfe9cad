//! `tidemark dbversion` - print the current database version.

use crate::config::DbConf;
use crate::error::CliResult;

/// Run `tidemark dbversion`
pub async fn run(conf: &DbConf) -> CliResult<()> {
    let engine = super::engine(conf)?;
    let mut conn = super::connect(conf).await?;

    let version = engine.ensure_version(&mut *conn).await?;
    println!("tidemark: version {}", version);
    Ok(())
}
