//! `tidemark status` - show the applied state of every migration.

use crate::config::DbConf;
use crate::error::CliResult;
use crate::output;

/// Applied-at timestamp format, e.g. `Mon Jan  6 11:25:03 2025`
const APPLIED_AT_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Run `tidemark status`
pub async fn run(conf: &DbConf) -> CliResult<()> {
    let engine = super::engine(conf)?;
    let mut conn = super::connect(conf).await?;

    let entries = engine.status(&mut *conn).await?;
    let current = engine.ensure_version(&mut *conn).await?;

    output::header("Migration Status");
    output::kv("Environment", &conf.env);
    output::kv("Migrations", &conf.migrations_dir.display().to_string());
    output::kv("Version", &current.to_string());
    output::newline();

    if entries.is_empty() {
        output::warn("No migrations found");
        return Ok(());
    }

    println!("    {:<24} Migration", "Applied At");
    output::dim(&format!("    {}", "=".repeat(48)));

    for entry in &entries {
        let file = entry
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.version.to_string());

        let applied = match (entry.applied, entry.applied_at) {
            (true, Some(at)) => {
                let at = at.format(APPLIED_AT_FORMAT).to_string();
                output::style_success(&format!("{:<24}", at))
            }
            (true, None) => output::style_success(&format!("{:<24}", "Applied")),
            (false, _) => output::style_pending(&format!("{:<24}", "Pending")),
        };
        println!("    {} -- {}", applied, file);
    }

    let pending = entries.iter().filter(|e| !e.applied).count();
    output::newline();
    if pending == 0 {
        output::success("Database is up to date");
    } else {
        output::info(&format!("{} pending migration(s)", pending));
    }

    Ok(())
}
