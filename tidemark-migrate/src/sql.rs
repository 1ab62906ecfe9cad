//! SQL migration script parsing.
//!
//! A script carries an `Up` and a `Down` section, each introduced by a marker
//! line. Statements end at a line ending in `;`, ignoring a trailing `--`
//! comment. Bodies that contain semicolons of their own (functions,
//! triggers) are wrapped in `StatementBegin` / `StatementEnd` and kept as
//! one statement.
//!
//! ```sql
//! -- +tidemark Up
//! CREATE TABLE t (v TEXT);
//!
//! -- +tidemark StatementBegin
//! CREATE TRIGGER t_ins AFTER INSERT ON t BEGIN
//!     SELECT 1;
//! END;
//! -- +tidemark StatementEnd
//!
//! -- +tidemark Down
//! DROP TABLE t;
//! ```

use crate::error::{MigrateResult, MigrationError};
use crate::plan::Direction;

/// Prefix shared by every marker line.
pub const MARKER_PREFIX: &str = "-- +tidemark";

/// Statements of both sections of a script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlScript {
    /// Statements run when applying.
    pub up: Vec<String>,
    /// Statements run when reverting.
    pub down: Vec<String>,
}

impl SqlScript {
    /// Parse a script.
    pub fn parse(content: &str) -> MigrateResult<Self> {
        ScriptParser::default().parse(content)
    }

    /// Statements for one direction.
    pub fn statements(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    /// Take the statements for one direction.
    pub fn into_statements(self, direction: Direction) -> Vec<String> {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Up,
    Down,
    StatementBegin,
    StatementEnd,
}

fn parse_marker(line: &str, line_no: usize) -> MigrateResult<Option<Marker>> {
    let Some(rest) = line.trim().strip_prefix(MARKER_PREFIX) else {
        return Ok(None);
    };

    let marker = match rest.trim() {
        "Up" => Marker::Up,
        "Down" => Marker::Down,
        "StatementBegin" => Marker::StatementBegin,
        "StatementEnd" => Marker::StatementEnd,
        other => {
            return Err(MigrationError::invalid_migration(format!(
                "line {}: unknown marker '{}'",
                line_no, other
            )));
        }
    };
    Ok(Some(marker))
}

/// Cut a trailing `--` comment that is not inside a quoted string.
fn strip_line_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut prev_dash = false;
    for (idx, ch) in line.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                '-' if prev_dash => return &line[..idx - 1],
                _ => {}
            },
        }
        prev_dash = quote.is_none() && ch == '-';
    }
    line
}

#[derive(Debug, Default)]
struct ScriptParser {
    script: SqlScript,
    section: Option<Direction>,
    buf: String,
    block_start: Option<usize>,
    statement_start: usize,
}

impl ScriptParser {
    fn parse(mut self, content: &str) -> MigrateResult<SqlScript> {
        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;

            if let Some(marker) = parse_marker(line, line_no)? {
                self.marker(marker, line_no)?;
                continue;
            }

            if self.section.is_none() {
                continue;
            }

            let trimmed = line.trim();
            if self.block_start.is_none() {
                if trimmed.starts_with("--") {
                    continue;
                }
                if trimmed.is_empty() && self.buf.is_empty() {
                    continue;
                }
            }

            if self.buf.is_empty() {
                self.statement_start = line_no;
            }
            self.buf.push_str(line);
            self.buf.push('\n');

            if self.block_start.is_none()
                && strip_line_comment(trimmed).trim_end().ends_with(';')
            {
                self.push_statement();
            }
        }

        if self.section.is_none() {
            return Err(MigrationError::invalid_migration(format!(
                "no '{} Up' or '{} Down' marker found",
                MARKER_PREFIX, MARKER_PREFIX
            )));
        }
        self.close_section()?;
        Ok(self.script)
    }

    fn marker(&mut self, marker: Marker, line_no: usize) -> MigrateResult<()> {
        match marker {
            Marker::Up | Marker::Down => {
                self.close_section()?;
                self.section = Some(if marker == Marker::Up {
                    Direction::Up
                } else {
                    Direction::Down
                });
            }
            Marker::StatementBegin => {
                if self.section.is_none() {
                    return Err(MigrationError::invalid_migration(format!(
                        "line {}: StatementBegin outside of an Up or Down section",
                        line_no
                    )));
                }
                if let Some(start) = self.block_start {
                    return Err(MigrationError::invalid_migration(format!(
                        "line {}: StatementBegin inside the block opened at line {}",
                        line_no, start
                    )));
                }
                if !self.buf.trim().is_empty() {
                    return Err(self.unterminated());
                }
                self.buf.clear();
                self.block_start = Some(line_no);
            }
            Marker::StatementEnd => {
                if self.block_start.take().is_none() {
                    return Err(MigrationError::invalid_migration(format!(
                        "line {}: StatementEnd without StatementBegin",
                        line_no
                    )));
                }
                self.push_statement();
            }
        }
        Ok(())
    }

    fn push_statement(&mut self) {
        let statement = self.buf.trim();
        if !statement.is_empty() {
            let statement = statement.to_string();
            match self.section {
                Some(Direction::Up) => self.script.up.push(statement),
                Some(Direction::Down) => self.script.down.push(statement),
                None => {}
            }
        }
        self.buf.clear();
    }

    fn close_section(&mut self) -> MigrateResult<()> {
        if let Some(start) = self.block_start {
            return Err(MigrationError::invalid_migration(format!(
                "StatementBegin at line {} is never closed",
                start
            )));
        }
        if !self.buf.trim().is_empty() {
            return Err(self.unterminated());
        }
        self.buf.clear();
        Ok(())
    }

    fn unterminated(&self) -> MigrationError {
        MigrationError::invalid_migration(format!(
            "statement starting at line {} is not terminated by ';'",
            self.statement_start
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple_script() {
        let script = SqlScript::parse(
            "-- +tidemark Up\n\
             CREATE TABLE t (v TEXT);\n\
             \n\
             -- +tidemark Down\n\
             DROP TABLE t;\n",
        )
        .unwrap();

        assert_eq!(script.up, vec!["CREATE TABLE t (v TEXT);"]);
        assert_eq!(script.down, vec!["DROP TABLE t;"]);
        assert_eq!(script.statements(Direction::Down), ["DROP TABLE t;"]);
    }

    #[test]
    fn test_multi_line_and_multiple_statements() {
        let script = SqlScript::parse(
            "-- +tidemark Up\n\
             CREATE TABLE users (\n\
             \x20   id INTEGER PRIMARY KEY,\n\
             \x20   name TEXT\n\
             );\n\
             -- seed data\n\
             INSERT INTO users (name) VALUES ('a');\n\
             -- +tidemark Down\n\
             DROP TABLE users;\n",
        )
        .unwrap();

        assert_eq!(script.up.len(), 2);
        assert!(script.up[0].starts_with("CREATE TABLE users ("));
        assert!(script.up[0].ends_with(");"));
        assert_eq!(script.up[1], "INSERT INTO users (name) VALUES ('a');");
    }

    #[test]
    fn test_trailing_comment_after_semicolon() {
        let script = SqlScript::parse(
            "-- +tidemark Up\n\
             CREATE TABLE t (v TEXT); -- the table\n\
             INSERT INTO t (v) VALUES ('a;--b'); -- seed\n\
             -- +tidemark Down\n\
             DROP TABLE t;\n",
        )
        .unwrap();

        assert_eq!(
            script.up,
            vec![
                "CREATE TABLE t (v TEXT); -- the table",
                "INSERT INTO t (v) VALUES ('a;--b'); -- seed",
            ]
        );
        assert_eq!(script.down, vec!["DROP TABLE t;"]);
    }

    #[test]
    fn test_semicolon_inside_trailing_comment_does_not_end_statement() {
        let err = SqlScript::parse(
            "-- +tidemark Up\n\
             CREATE TABLE t (v TEXT) -- done;\n\
             -- +tidemark Down\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_strip_line_comment() {
        assert_eq!(strip_line_comment("SELECT 1; -- x"), "SELECT 1; ");
        assert_eq!(strip_line_comment("SELECT '--';"), "SELECT '--';");
        assert_eq!(strip_line_comment("SELECT 1 - -2;"), "SELECT 1 - -2;");
        assert_eq!(strip_line_comment("SELECT 1;"), "SELECT 1;");
    }

    #[test]
    fn test_statement_block_kept_whole() {
        let script = SqlScript::parse(
            "-- +tidemark Up\n\
             -- +tidemark StatementBegin\n\
             CREATE TRIGGER t_ins AFTER INSERT ON t BEGIN\n\
             \x20   SELECT 1;\n\
             END;\n\
             -- +tidemark StatementEnd\n\
             -- +tidemark Down\n\
             DROP TRIGGER t_ins;\n",
        )
        .unwrap();

        assert_eq!(script.up.len(), 1);
        assert!(script.up[0].contains("SELECT 1;"));
        assert!(script.up[0].ends_with("END;"));
    }

    #[test]
    fn test_text_before_first_marker_is_ignored() {
        let script = SqlScript::parse(
            "This migration does things.\n\
             -- +tidemark Up\n\
             SELECT 1;\n",
        )
        .unwrap();
        assert_eq!(script.up, vec!["SELECT 1;"]);
        assert!(script.down.is_empty());
    }

    #[test]
    fn test_empty_section_is_valid() {
        let script = SqlScript::parse("-- +tidemark Up\n-- +tidemark Down\n").unwrap();
        assert!(script.up.is_empty());
        assert!(script.down.is_empty());
    }

    #[test]
    fn test_missing_markers() {
        let err = SqlScript::parse("CREATE TABLE t (v TEXT);\n").unwrap_err();
        assert!(matches!(err, MigrationError::InvalidMigration(_)));
    }

    #[test]
    fn test_unterminated_statement() {
        let err = SqlScript::parse(
            "-- +tidemark Up\n\
             CREATE TABLE t (v TEXT)\n\
             -- +tidemark Down\n\
             DROP TABLE t;\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_unclosed_block() {
        let err = SqlScript::parse(
            "-- +tidemark Up\n\
             -- +tidemark StatementBegin\n\
             SELECT 1;\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("never closed"));
    }

    #[test]
    fn test_stray_statement_end() {
        let err = SqlScript::parse("-- +tidemark Up\n-- +tidemark StatementEnd\n").unwrap_err();
        assert!(err.to_string().contains("without StatementBegin"));
    }

    #[test]
    fn test_unknown_marker() {
        let err = SqlScript::parse("-- +tidemark Sideways\n").unwrap_err();
        assert!(err.to_string().contains("Sideways"));
    }

    #[test]
    fn test_into_statements() {
        let script = SqlScript::parse("-- +tidemark Up\nSELECT 1;\nSELECT 2;\n").unwrap();
        assert_eq!(
            script.into_statements(Direction::Up),
            vec!["SELECT 1;".to_string(), "SELECT 2;".to_string()]
        );
    }
}
