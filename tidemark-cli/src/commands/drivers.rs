//! `tidemark drivers` - list the drivers this binary can connect with.

use tidemark_migrate::DialectKind;

use crate::error::CliResult;
use crate::output;

/// Driver names understood in configuration, with the dialect each implies
pub const DRIVERS: &[(&str, DialectKind)] = &[
    ("postgres", DialectKind::Postgres),
    ("redshift", DialectKind::Redshift),
    ("mysql", DialectKind::MySql),
    ("sqlite3", DialectKind::Sqlite),
];

/// Whether a connector for `driver` is compiled in
pub fn is_available(driver: &str) -> bool {
    match driver {
        "sqlite3" | "sqlite" => cfg!(feature = "sqlite"),
        "postgres" | "postgresql" | "redshift" => cfg!(feature = "postgres"),
        _ => false,
    }
}

/// Run `tidemark drivers`
pub fn run() -> CliResult<()> {
    output::header("Drivers");

    for (name, dialect) in DRIVERS {
        let state = if is_available(name) {
            output::style_success("available")
        } else {
            output::style_pending("dialect only")
        };
        println!("  {:<10} {:<10} {}", name, dialect.as_str(), state);
    }

    output::newline();
    output::dim("Other drivers can be used with `dialect = \"generic\"` once a connector exists.");
    Ok(())
}
