//! CLI configuration handling.
//!
//! Settings come from a `dbconf.toml` whose top-level tables are
//! environments:
//!
//! ```toml
//! [development]
//! driver = "sqlite3"
//! open = "db/dev.db"
//!
//! [production]
//! driver = "postgres"
//! open = "${DATABASE_URL}"
//! migrations_dir = "migrations"
//! ```
//!
//! When no file is found the environment is assembled from `DB_DRIVER`,
//! `DB_DSN` (or `DATABASE_URL`), `DB_MIGRATIONS_DIR` and `DB_DIALECT`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tidemark_migrate::{DEFAULT_VERSION_TABLE, DialectKind};

use crate::error::{CliError, CliResult};

/// Config file name searched for at every directory level
pub const CONFIG_FILE_NAME: &str = "dbconf.toml";

/// Default migrations directory (relative to the config file)
pub const MIGRATIONS_DIR: &str = "migrations";

/// One environment table as written in `dbconf.toml`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// Driver name (postgres, redshift, mysql, sqlite3, ...)
    pub driver: String,

    /// Connection string handed to the driver
    #[serde(default)]
    pub open: String,

    /// Migrations directory
    #[serde(default)]
    pub migrations_dir: Option<PathBuf>,

    /// Dialect override
    #[serde(default)]
    pub dialect: Option<String>,

    /// Ledger table name
    #[serde(default)]
    pub table: Option<String>,

    /// Command running code migrations instead of cargo
    #[serde(default)]
    pub code_command: Option<Vec<String>>,

    /// Extra Cargo dependency lines for code migrations
    #[serde(default)]
    pub code_dependencies: Vec<String>,
}

/// Fully resolved settings for one environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConf {
    /// Environment name
    pub env: String,
    /// Normalized driver name
    pub driver: String,
    /// Connection string, variables expanded
    pub dsn: String,
    /// Ledger dialect
    pub dialect: DialectKind,
    /// Migrations directory
    pub migrations_dir: PathBuf,
    /// Ledger table name
    pub table: String,
    /// Command running code migrations, if configured
    pub code_command: Option<Vec<String>>,
    /// Extra Cargo dependency lines for code migrations
    pub code_dependencies: Vec<String>,
    /// Directory relative paths were resolved against
    pub base_dir: PathBuf,
    /// Config file the settings came from, if any
    pub source: Option<PathBuf>,
}

impl DbConf {
    /// Load the settings for `env`, searching for a config file from `start`
    pub fn load(start: &Path, env: &str) -> CliResult<Self> {
        match find_config(start)? {
            Some(path) => Self::from_file(&path, env),
            None => Self::from_lookup(start, env, |name| std::env::var(name).ok()),
        }
    }

    /// Load the settings for `env` from a config file
    pub fn from_file(path: &Path, env: &str) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let mut conf = Self::parse(&content, env, &base_dir, |name| std::env::var(name).ok())?;
        conf.source = Some(path.to_path_buf());
        Ok(conf)
    }

    /// Parse `dbconf.toml` content and resolve `env`
    pub fn parse(
        content: &str,
        env: &str,
        base_dir: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> CliResult<Self> {
        let mut environments: BTreeMap<String, EnvironmentConfig> = toml::from_str(content)?;
        let available = environments.keys().cloned().collect::<Vec<_>>().join(", ");

        let raw = environments.remove(env).ok_or_else(|| {
            CliError::Config(format!(
                "environment '{}' not found (available: {})",
                env, available
            ))
        })?;

        Self::resolve(env, raw, base_dir, lookup)
    }

    /// Assemble the settings from environment variables
    pub fn from_lookup(
        start: &Path,
        env: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> CliResult<Self> {
        let driver = lookup("DB_DRIVER").ok_or_else(|| {
            CliError::Config(format!(
                "no {} found from {} and DB_DRIVER is not set",
                CONFIG_FILE_NAME,
                start.display()
            ))
        })?;
        let open = lookup("DB_DSN")
            .or_else(|| lookup("DATABASE_URL"))
            .unwrap_or_default();

        let raw = EnvironmentConfig {
            driver,
            open,
            migrations_dir: lookup("DB_MIGRATIONS_DIR").map(PathBuf::from),
            dialect: lookup("DB_DIALECT"),
            table: None,
            code_command: None,
            code_dependencies: Vec::new(),
        };

        Self::resolve(env, raw, start, lookup)
    }

    fn resolve(
        env: &str,
        raw: EnvironmentConfig,
        base_dir: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> CliResult<Self> {
        let driver = expand_vars(&raw.driver, &lookup)?.trim().to_ascii_lowercase();
        if driver.is_empty() {
            return Err(CliError::Config(format!(
                "environment '{}' has no driver",
                env
            )));
        }

        let dialect = match raw.dialect.as_deref() {
            Some(name) => name
                .parse::<DialectKind>()
                .map_err(|e| CliError::Config(e.to_string()))?,
            None => driver_dialect(&driver).ok_or_else(|| {
                CliError::Config(format!(
                    "unknown driver '{}'; set `dialect` to one of: {}",
                    driver,
                    dialect_names()
                ))
            })?,
        };

        let migrations_dir = base_dir.join(
            raw.migrations_dir
                .unwrap_or_else(|| PathBuf::from(MIGRATIONS_DIR)),
        );

        Ok(Self {
            env: env.to_string(),
            driver,
            dsn: expand_vars(&raw.open, &lookup)?,
            dialect,
            migrations_dir,
            table: raw.table.unwrap_or_else(|| DEFAULT_VERSION_TABLE.to_string()),
            code_command: raw.code_command,
            code_dependencies: raw.code_dependencies,
            base_dir: base_dir.to_path_buf(),
            source: None,
        })
    }
}

/// The dialect a driver name implies
pub fn driver_dialect(driver: &str) -> Option<DialectKind> {
    match driver {
        "postgres" | "postgresql" => Some(DialectKind::Postgres),
        "redshift" => Some(DialectKind::Redshift),
        "mysql" | "mymysql" => Some(DialectKind::MySql),
        "sqlite3" | "sqlite" => Some(DialectKind::Sqlite),
        _ => None,
    }
}

fn dialect_names() -> String {
    DialectKind::ALL
        .iter()
        .map(|d| d.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Find the config file for `start`.
///
/// Each directory from `start` up to the filesystem root is checked for
/// `dbconf.toml`, then `db/dbconf.toml`.
pub fn find_config(start: &Path) -> CliResult<Option<PathBuf>> {
    let start = std::path::absolute(start)?;

    for dir in start.ancestors() {
        for candidate in [dir.join(CONFIG_FILE_NAME), dir.join("db").join(CONFIG_FILE_NAME)] {
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
        }
    }

    Ok(None)
}

/// Expand `${VAR}` and `$VAR` references. Unset variables expand to nothing.
pub fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> CliResult<String> {
    if !input.contains('$') {
        return Ok(input.to_string());
    }

    let re = regex_lite::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .map_err(|e| CliError::Config(format!("variable pattern: {}", e)))?;

    let expanded = re.replace_all(input, |caps: &regex_lite::Captures<'_>| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        lookup(name).unwrap_or_default()
    });

    Ok(expanded.into_owned())
}
