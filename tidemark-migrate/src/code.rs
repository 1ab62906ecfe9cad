//! Out-of-process code migrations.
//!
//! A code migration is a Rust source file defining `up()` and `down()`. The
//! engine never links it in; an executor runs it as a separate process
//! against the same database and reports the exit status.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Output;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::dialect::DialectKind;
use crate::error::{MigrateResult, MigrationError};
use crate::plan::Direction;

/// How to reach the target database, as handed to child processes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Driver name, e.g. `postgres` or `sqlite3`.
    pub driver: String,
    /// Driver-specific connection string.
    pub dsn: String,
    /// Dialect used for the ledger table.
    pub dialect: DialectKind,
}

impl ConnectionConfig {
    /// Create a connection config.
    pub fn new(driver: impl Into<String>, dsn: impl Into<String>, dialect: DialectKind) -> Self {
        Self {
            driver: driver.into(),
            dsn: dsn.into(),
            dialect,
        }
    }
}

/// One code migration to run.
#[derive(Debug, Clone, Copy)]
pub struct CodeMigrationRequest<'a> {
    /// Version of the unit.
    pub version: i64,
    /// Whether to call `up()` or `down()`.
    pub direction: Direction,
    /// Path of the migration source.
    pub source: &'a Path,
    /// Target database.
    pub connection: &'a ConnectionConfig,
}

impl CodeMigrationRequest<'_> {
    /// Environment variables exported to the child process.
    pub fn env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("DATABASE_URL", self.connection.dsn.clone()),
            ("TIDEMARK_DRIVER", self.connection.driver.clone()),
            ("TIDEMARK_DIALECT", self.connection.dialect.to_string()),
            ("TIDEMARK_VERSION", self.version.to_string()),
            ("TIDEMARK_DIRECTION", self.direction.to_string()),
        ]
    }
}

/// Result of running a code migration process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeMigrationOutcome {
    /// Exit code; `None` when the process was killed by a signal.
    pub status: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CodeMigrationOutcome {
    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Diagnostic message for a failed run.
    pub fn failure_message(&self) -> String {
        let status = match self.status {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            status
        } else {
            format!("{}: {}", status, stderr)
        }
    }
}

impl From<Output> for CodeMigrationOutcome {
    fn from(output: Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs code migrations.
#[async_trait::async_trait]
pub trait CodeMigrationExecutor: Send + Sync + fmt::Debug {
    /// Run one code migration and wait for it to finish.
    ///
    /// `Err` means the process could not be started at all; a process that
    /// ran and failed is an `Ok` outcome with a non-zero status.
    async fn execute(&self, request: &CodeMigrationRequest<'_>) -> MigrateResult<CodeMigrationOutcome>;
}

/// Builds each migration into a throw-away Cargo project and runs it.
#[derive(Debug, Clone)]
pub struct CargoExecutor {
    cargo: String,
    dependencies: Vec<String>,
    target_dir: Option<PathBuf>,
}

impl Default for CargoExecutor {
    fn default() -> Self {
        Self {
            cargo: "cargo".to_string(),
            dependencies: Vec::new(),
            target_dir: None,
        }
    }
}

impl CargoExecutor {
    /// Create an executor using `cargo` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different cargo binary.
    pub fn cargo(mut self, cargo: impl Into<String>) -> Self {
        self.cargo = cargo.into();
        self
    }

    /// Add a `[dependencies]` line, e.g. `rusqlite = "0.32"`.
    pub fn dependency(mut self, line: impl Into<String>) -> Self {
        self.dependencies.push(line.into());
        self
    }

    /// Add several `[dependencies]` lines.
    pub fn dependencies<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Share a build directory across runs so dependencies compile once.
    pub fn target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = Some(dir.into());
        self
    }

    /// Generate the Cargo manifest for one migration.
    pub fn manifest(&self, version: i64) -> String {
        let mut manifest = format!(
            "[package]\n\
             name = \"tidemark-migration-{}\"\n\
             version = \"0.1.0\"\n\
             edition = \"2024\"\n\
             publish = false\n\
             \n\
             [workspace]\n\
             \n\
             [dependencies]\n",
            version
        );
        for line in &self.dependencies {
            manifest.push_str(line);
            manifest.push('\n');
        }
        manifest
    }

    /// Generate the `main` that dispatches to the migration.
    pub fn main_source(version: i64, direction: Direction) -> String {
        format!(
            "mod migration;\n\
             \n\
             fn main() {{\n\
             \x20   if let Err(e) = migration::{direction}() {{\n\
             \x20       eprintln!(\"migration {version} {direction} failed: {{}}\", e);\n\
             \x20       std::process::exit(1);\n\
             \x20   }}\n\
             }}\n"
        )
    }

    /// Lay out the build project for `request` in `dir`.
    pub async fn write_project(
        &self,
        dir: &Path,
        request: &CodeMigrationRequest<'_>,
    ) -> MigrateResult<()> {
        let src = dir.join("src");
        tokio::fs::create_dir_all(&src).await?;
        tokio::fs::copy(request.source, src.join("migration.rs")).await?;
        tokio::fs::write(
            src.join("main.rs"),
            Self::main_source(request.version, request.direction),
        )
        .await?;
        tokio::fs::write(dir.join("Cargo.toml"), self.manifest(request.version)).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CodeMigrationExecutor for CargoExecutor {
    async fn execute(&self, request: &CodeMigrationRequest<'_>) -> MigrateResult<CodeMigrationOutcome> {
        let project = tempfile::Builder::new()
            .prefix("tidemark-migration-")
            .tempdir()?;
        self.write_project(project.path(), request).await?;

        let mut cmd = Command::new(&self.cargo);
        cmd.arg("run")
            .arg("--quiet")
            .arg("--manifest-path")
            .arg(project.path().join("Cargo.toml"))
            .envs(request.env());
        if let Some(dir) = &self.target_dir {
            cmd.env("CARGO_TARGET_DIR", dir);
        }

        debug!(
            version = request.version,
            direction = %request.direction,
            project = %project.path().display(),
            "Running code migration with cargo"
        );

        let output = cmd.output().await.map_err(|e| {
            MigrationError::code_migration(format!("failed to start {}: {}", self.cargo, e))
        })?;
        Ok(output.into())
    }
}

/// Runs a fixed command for each migration.
///
/// Arguments may contain `{path}`, `{version}` and `{direction}`, which are
/// replaced per migration.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandExecutor {
    /// Create an executor for `program` with `args`.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
        }
    }

    /// Create an executor from a full argument vector.
    pub fn from_argv(argv: &[String]) -> MigrateResult<Self> {
        match argv.split_first() {
            Some((program, args)) if !program.is_empty() => Ok(Self::new(program.clone(), args.iter().cloned())),
            _ => Err(MigrationError::config("code migration command must not be empty")),
        }
    }

    /// Run the command from `dir`.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Arguments with placeholders replaced for `request`.
    pub fn render_args(&self, request: &CodeMigrationRequest<'_>) -> Vec<String> {
        let path = request.source.display().to_string();
        let version = request.version.to_string();
        let direction = request.direction.as_str();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{path}", &path)
                    .replace("{version}", &version)
                    .replace("{direction}", direction)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl CodeMigrationExecutor for CommandExecutor {
    async fn execute(&self, request: &CodeMigrationRequest<'_>) -> MigrateResult<CodeMigrationOutcome> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(request)).envs(request.env());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        debug!(
            version = request.version,
            direction = %request.direction,
            program = %self.program,
            "Running code migration command"
        );

        let output = cmd.output().await.map_err(|e| {
            MigrationError::code_migration(format!("failed to start {}: {}", self.program, e))
        })?;
        Ok(output.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn connection() -> ConnectionConfig {
        ConnectionConfig::new("sqlite3", "file:test.db", DialectKind::Sqlite)
    }

    #[test]
    fn test_request_env() {
        let conn = connection();
        let request = CodeMigrationRequest {
            version: 42,
            direction: Direction::Down,
            source: Path::new("42_backfill.rs"),
            connection: &conn,
        };
        let env = request.env();
        assert!(env.contains(&("DATABASE_URL", "file:test.db".to_string())));
        assert!(env.contains(&("TIDEMARK_DIALECT", "sqlite3".to_string())));
        assert!(env.contains(&("TIDEMARK_VERSION", "42".to_string())));
        assert!(env.contains(&("TIDEMARK_DIRECTION", "down".to_string())));
    }

    #[test]
    fn test_outcome_failure_message() {
        let outcome = CodeMigrationOutcome {
            status: Some(2),
            stdout: String::new(),
            stderr: "table missing\n".to_string(),
        };
        assert!(!outcome.success());
        assert_eq!(outcome.failure_message(), "exit status 2: table missing");

        let killed = CodeMigrationOutcome {
            status: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(killed.failure_message(), "terminated by signal");
    }

    #[test]
    fn test_command_placeholders() {
        let conn = connection();
        let request = CodeMigrationRequest {
            version: 7,
            direction: Direction::Up,
            source: Path::new("db/7_fill.rs"),
            connection: &conn,
        };
        let exec = CommandExecutor::new("runner", ["{path}", "--{direction}", "v{version}"]);
        assert_eq!(
            exec.render_args(&request),
            vec!["db/7_fill.rs", "--up", "v7"]
        );
    }

    #[test]
    fn test_from_argv() {
        assert!(CommandExecutor::from_argv(&[]).is_err());
        let exec = CommandExecutor::from_argv(&["sh".to_string(), "{path}".to_string()]).unwrap();
        assert_eq!(exec.program, "sh");
        assert_eq!(exec.args, vec!["{path}"]);
    }

    #[test]
    fn test_cargo_manifest_and_main() {
        let exec = CargoExecutor::new().dependency("rusqlite = \"0.32\"");
        let manifest = exec.manifest(20240101000000);
        assert!(manifest.contains("name = \"tidemark-migration-20240101000000\""));
        assert!(manifest.contains("[workspace]"));
        assert!(manifest.ends_with("rusqlite = \"0.32\"\n"));

        let main = CargoExecutor::main_source(3, Direction::Down);
        assert!(main.contains("mod migration;"));
        assert!(main.contains("migration::down()"));
        assert!(main.contains("std::process::exit(1)"));
    }

    #[tokio::test]
    async fn test_cargo_write_project() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("5_seed.rs");
        std::fs::write(&source, "pub fn up() {}\npub fn down() {}\n").unwrap();

        let conn = connection();
        let request = CodeMigrationRequest {
            version: 5,
            direction: Direction::Up,
            source: &source,
            connection: &conn,
        };
        let project = dir.path().join("project");
        CargoExecutor::new()
            .write_project(&project, &request)
            .await
            .unwrap();

        let copied = std::fs::read_to_string(project.join("src/migration.rs")).unwrap();
        assert!(copied.contains("pub fn up()"));
        assert!(project.join("src/main.rs").exists());
        assert!(project.join("Cargo.toml").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_executor_success() {
        let conn = connection();
        let request = CodeMigrationRequest {
            version: 3,
            direction: Direction::Up,
            source: Path::new("3_x.rs"),
            connection: &conn,
        };
        let exec = CommandExecutor::new(
            "sh",
            ["-c", "echo \"$TIDEMARK_DIRECTION-$TIDEMARK_VERSION {path}\""],
        );
        let outcome = exec.execute(&request).await.unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout.trim(), "up-3 3_x.rs");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_executor_failure() {
        let conn = connection();
        let request = CodeMigrationRequest {
            version: 3,
            direction: Direction::Down,
            source: Path::new("3_x.rs"),
            connection: &conn,
        };
        let exec = CommandExecutor::new("sh", ["-c", "echo boom >&2; exit 3"]);
        let outcome = exec.execute(&request).await.unwrap();
        assert_eq!(outcome.status, Some(3));
        assert_eq!(outcome.failure_message(), "exit status 3: boom");
    }

    #[tokio::test]
    async fn test_command_executor_missing_program() {
        let conn = connection();
        let request = CodeMigrationRequest {
            version: 1,
            direction: Direction::Up,
            source: Path::new("1_x.rs"),
            connection: &conn,
        };
        let exec = CommandExecutor::new("tidemark-no-such-program", Vec::<String>::new());
        let err = exec.execute(&request).await.unwrap_err();
        assert!(matches!(err, MigrationError::CodeMigration(_)));
    }
}
