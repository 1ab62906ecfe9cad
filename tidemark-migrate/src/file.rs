//! Migration file discovery and creation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MigrateResult, MigrationError};

/// Format of the version prefix written by [`MigrationFileManager::create_migration`].
pub const VERSION_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// How a migration is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationKind {
    /// A `.sql` script with `Up` and `Down` sections.
    Sql,
    /// A `.rs` program run out of process.
    Code,
}

impl MigrationKind {
    /// Recognize a migration by its file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "sql" => Some(Self::Sql),
            "rs" => Some(Self::Code),
            _ => None,
        }
    }

    /// File extension written for this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Code => "rs",
        }
    }
}

impl fmt::Display for MigrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for MigrationKind {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sql" => Ok(Self::Sql),
            "rs" | "rust" | "code" => Ok(Self::Code),
            other => Err(MigrationError::config(format!(
                "migration type must be 'sql' or 'rs', got '{}'",
                other
            ))),
        }
    }
}

/// A discovered migration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationUnit {
    /// Version parsed from the file name.
    pub version: i64,
    /// Description part of the file name, without the extension.
    pub name: String,
    /// Path of the file.
    pub path: PathBuf,
    /// How the migration runs.
    pub kind: MigrationKind,
}

impl MigrationUnit {
    /// File name of the unit, for display.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// A file name that follows the `<digits>_<description>.<ext>` convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    /// Numeric version prefix.
    pub version: i64,
    /// Description between the separator and the extension.
    pub name: String,
    /// Kind implied by the extension.
    pub kind: MigrationKind,
}

/// Parse a migration file name.
///
/// Returns `Ok(None)` for files that are not migrations at all (wrong
/// extension, no `_` separator, non-numeric prefix). A numeric prefix that is
/// not a positive 64-bit integer is a configuration error.
pub fn parse_migration_name(file_name: &str) -> MigrateResult<Option<ParsedName>> {
    let Some((stem, ext)) = file_name.rsplit_once('.') else {
        return Ok(None);
    };
    let Some(kind) = MigrationKind::from_extension(ext) else {
        return Ok(None);
    };
    let Some((prefix, name)) = stem.split_once('_') else {
        return Ok(None);
    };

    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(None);
    }

    let version: i64 = prefix.parse().map_err(|_| {
        MigrationError::config(format!(
            "migration version in '{}' does not fit in 64 bits",
            file_name
        ))
    })?;

    if version <= 0 {
        return Err(MigrationError::config(format!(
            "migration versions must be greater than zero: '{}'",
            file_name
        )));
    }

    Ok(Some(ParsedName {
        version,
        name: name.to_string(),
        kind,
    }))
}

/// Reads and writes migration files in one directory tree.
#[derive(Debug, Clone)]
pub struct MigrationFileManager {
    /// Directory where migrations are stored.
    migrations_dir: PathBuf,
}

impl MigrationFileManager {
    /// Create a new file manager.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Get the migrations directory.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Ensure the migrations directory exists.
    pub async fn ensure_dir(&self) -> MigrateResult<()> {
        tokio::fs::create_dir_all(&self.migrations_dir)
            .await
            .map_err(MigrationError::Io)?;
        Ok(())
    }

    /// Discover every migration below the directory, sorted by version.
    ///
    /// Files that do not follow the naming convention are skipped. Two files
    /// with the same version are an error naming both.
    pub async fn discover(&self) -> MigrateResult<Vec<MigrationUnit>> {
        let mut units: Vec<MigrationUnit> = Vec::new();
        let mut pending = vec![self.migrations_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| unreadable(&dir, e))?;

            while let Some(entry) = entries.next_entry().await.map_err(|e| unreadable(&dir, e))? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| unreadable(&path, e))?;

                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };

                let Some(parsed) = parse_migration_name(file_name)? else {
                    debug!(path = %path.display(), "Skipping non-migration file");
                    continue;
                };

                if let Some(existing) = units.iter().find(|u| u.version == parsed.version) {
                    return Err(MigrationError::DuplicateVersion {
                        version: parsed.version,
                        first: existing.path.clone(),
                        second: path,
                    });
                }

                units.push(MigrationUnit {
                    version: parsed.version,
                    name: parsed.name,
                    path,
                    kind: parsed.kind,
                });
            }
        }

        units.sort_by_key(|u| u.version);
        debug!(
            dir = %self.migrations_dir.display(),
            count = units.len(),
            "Discovered migrations"
        );
        Ok(units)
    }

    /// Highest version on disk.
    pub async fn most_recent_version(&self) -> MigrateResult<i64> {
        self.discover()
            .await?
            .last()
            .map(|u| u.version)
            .ok_or_else(|| MigrationError::NoMigrations(self.migrations_dir.clone()))
    }

    /// Highest version on disk strictly below `version`.
    ///
    /// Returns 0 when `version` is itself on disk but nothing precedes it.
    pub async fn previous_version(&self, version: i64) -> MigrateResult<i64> {
        let units = self.discover().await?;
        previous_version_in(&units, version)
    }

    /// Write a new migration from the built-in template.
    ///
    /// The version prefix is `time` formatted as `YYYYMMDDHHMMSS`. An existing
    /// file is never overwritten.
    pub async fn create_migration(
        &self,
        name: &str,
        kind: MigrationKind,
        time: DateTime<Utc>,
    ) -> MigrateResult<PathBuf> {
        validate_migration_name(name)?;
        self.ensure_dir().await?;

        let id = time.format(VERSION_TIMESTAMP_FORMAT).to_string();
        let path = self
            .migrations_dir
            .join(format!("{}_{}.{}", id, name, kind.extension()));

        if tokio::fs::try_exists(&path).await.map_err(MigrationError::Io)? {
            return Err(MigrationError::config(format!(
                "migration file already exists: {}",
                path.display()
            )));
        }

        let content = match kind {
            MigrationKind::Sql => sql_template(),
            MigrationKind::Code => code_template(&id, name),
        };

        tokio::fs::write(&path, content)
            .await
            .map_err(MigrationError::Io)?;

        Ok(path)
    }
}

/// Previous-version lookup over an already discovered set.
pub fn previous_version_in(units: &[MigrationUnit], version: i64) -> MigrateResult<i64> {
    let previous = units
        .iter()
        .map(|u| u.version)
        .filter(|v| *v < version)
        .max();

    match previous {
        Some(v) => Ok(v),
        None if units.iter().any(|u| u.version == version) => Ok(0),
        None => Err(MigrationError::NoPreviousVersion(version)),
    }
}

fn unreadable(path: &Path, err: std::io::Error) -> MigrationError {
    warn!(path = %path.display(), error = %err, "Cannot read migrations directory");
    MigrationError::config(format!(
        "cannot read migrations directory {}: {}",
        path.display(),
        err
    ))
}

fn validate_migration_name(name: &str) -> MigrateResult<()> {
    if name.is_empty() {
        return Err(MigrationError::config("migration name must not be empty"));
    }
    if name.contains(['/', '\\', '.']) || name.chars().any(char::is_whitespace) {
        return Err(MigrationError::config(format!(
            "migration name '{}' may not contain path separators, dots or whitespace",
            name
        )));
    }
    Ok(())
}

fn sql_template() -> String {
    "\
-- +tidemark Up
-- SQL in this section is executed when the migration is applied.


-- +tidemark Down
-- SQL in this section is executed when the migration is rolled back.

"
    .to_string()
}

fn code_template(id: &str, name: &str) -> String {
    format!(
        "\
//! Migration {id}_{name}.
//!
//! Built and run as a standalone program. The target database is passed in
//! `DATABASE_URL`, the driver name in `TIDEMARK_DRIVER`.

use std::error::Error;

/// Apply the migration.
pub fn up() -> Result<(), Box<dyn Error>> {{
    Ok(())
}}

/// Roll the migration back.
pub fn down() -> Result<(), Box<dyn Error>> {{
    Ok(())
}}
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn test_parse_migration_name() {
        let parsed = parse_migration_name("20231215120000_create_users.sql")
            .unwrap()
            .unwrap();
        assert_eq!(parsed.version, 20231215120000);
        assert_eq!(parsed.name, "create_users");
        assert_eq!(parsed.kind, MigrationKind::Sql);

        let parsed = parse_migration_name("7_backfill.rs").unwrap().unwrap();
        assert_eq!(parsed.version, 7);
        assert_eq!(parsed.kind, MigrationKind::Code);
    }

    #[test]
    fn test_parse_migration_name_skips_non_migrations() {
        assert_eq!(parse_migration_name("README.md").unwrap(), None);
        assert_eq!(parse_migration_name("1_notes.txt").unwrap(), None);
        assert_eq!(parse_migration_name("12.sql").unwrap(), None);
        assert_eq!(parse_migration_name("abc_test.sql").unwrap(), None);
        assert_eq!(parse_migration_name("_x.sql").unwrap(), None);
        assert_eq!(parse_migration_name("sql").unwrap(), None);
    }

    #[test]
    fn test_parse_migration_name_rejects_non_positive() {
        let err = parse_migration_name("0_init.sql").unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("greater than zero"));

        let err = parse_migration_name("99999999999999999999_big.sql").unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_migration_kind_from_str() {
        assert_eq!("sql".parse::<MigrationKind>().unwrap(), MigrationKind::Sql);
        assert_eq!("RS".parse::<MigrationKind>().unwrap(), MigrationKind::Code);
        assert!("go".parse::<MigrationKind>().is_err());
    }

    #[tokio::test]
    async fn test_discover_sorted_and_recursive() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "3_c.sql");
        touch(dir.path(), "1_a.sql");
        touch(dir.path(), "nested/2_b.rs");
        touch(dir.path(), "README.md");
        touch(dir.path(), "notes_1.txt");

        let manager = MigrationFileManager::new(dir.path());
        let units = manager.discover().await.unwrap();

        let versions: Vec<_> = units.iter().map(|u| u.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(units[1].kind, MigrationKind::Code);
        assert_eq!(units[1].name, "b");
        assert_eq!(units[1].file_name(), "2_b.rs");
    }

    #[tokio::test]
    async fn test_discover_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "2_first.sql");
        touch(dir.path(), "sub/2_second.rs");

        let err = MigrationFileManager::new(dir.path())
            .discover()
            .await
            .unwrap_err();

        match err {
            MigrationError::DuplicateVersion {
                version,
                first,
                second,
            } => {
                assert_eq!(version, 2);
                let mut names = vec![
                    first.file_name().unwrap().to_string_lossy().into_owned(),
                    second.file_name().unwrap().to_string_lossy().into_owned(),
                ];
                names.sort();
                assert_eq!(names, vec!["2_first.sql", "2_second.rs"]);
            }
            other => panic!("expected duplicate version, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_discover_missing_dir_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = MigrationFileManager::new(dir.path().join("nope"))
            .discover()
            .await
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_most_recent_version() {
        let dir = TempDir::new().unwrap();
        let manager = MigrationFileManager::new(dir.path());
        assert!(matches!(
            manager.most_recent_version().await,
            Err(MigrationError::NoMigrations(_))
        ));

        touch(dir.path(), "5_e.sql");
        touch(dir.path(), "12_l.sql");
        assert_eq!(manager.most_recent_version().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_previous_version() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "1_a.sql");
        touch(dir.path(), "4_d.sql");
        touch(dir.path(), "9_i.sql");
        let manager = MigrationFileManager::new(dir.path());

        assert_eq!(manager.previous_version(9).await.unwrap(), 4);
        assert_eq!(manager.previous_version(5).await.unwrap(), 4);
        assert_eq!(manager.previous_version(1).await.unwrap(), 0);
        assert!(matches!(
            manager.previous_version(0).await,
            Err(MigrationError::NoPreviousVersion(0))
        ));
    }

    #[tokio::test]
    async fn test_create_migration() {
        let dir = TempDir::new().unwrap();
        let manager = MigrationFileManager::new(dir.path().join("migrations"));
        let time = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap();

        let path = manager
            .create_migration("add_users", MigrationKind::Sql, time)
            .await
            .unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "20240517083000_add_users.sql"
        );
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("-- +tidemark Up"));
        assert!(content.contains("-- +tidemark Down"));

        let later = Utc.with_ymd_and_hms(2024, 5, 17, 8, 31, 0).unwrap();
        let code = manager
            .create_migration("backfill", MigrationKind::Code, later)
            .await
            .unwrap();
        let content = std::fs::read_to_string(&code).unwrap();
        assert!(content.contains("pub fn up()"));
        assert!(content.contains("pub fn down()"));

        let units = manager.discover().await.unwrap();
        let versions: Vec<_> = units.iter().map(|u| u.version).collect();
        assert_eq!(versions, vec![20240517083000, 20240517083100]);
        assert!(
            manager
                .create_migration("add_users", MigrationKind::Sql, time)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_create_migration_rejects_bad_names() {
        let dir = TempDir::new().unwrap();
        let manager = MigrationFileManager::new(dir.path());
        let time = Utc::now();
        for name in ["", "a/b", "with space", "x.sql"] {
            assert!(
                manager
                    .create_migration(name, MigrationKind::Sql, time)
                    .await
                    .is_err(),
                "name {name:?} should be rejected"
            );
        }
    }
}
