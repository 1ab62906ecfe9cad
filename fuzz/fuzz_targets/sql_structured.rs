//! Structured fuzzing for the SQL migration script parser.
//!
//! Builds scripts line by line from markers, statements and comments so the
//! parser sees mostly well-formed input.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_sql_structured
//! ```

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tidemark_migrate::SqlScript;

/// One generated script line.
#[derive(Debug, Arbitrary)]
enum FuzzLine {
    Up,
    Down,
    StatementBegin,
    StatementEnd,
    UnknownMarker(u8),
    Statement(u8),
    Fragment(u8),
    Comment,
    Blank,
}

impl FuzzLine {
    fn render(&self) -> String {
        match self {
            Self::Up => "-- +tidemark Up".to_string(),
            Self::Down => "-- +tidemark Down".to_string(),
            Self::StatementBegin => "-- +tidemark StatementBegin".to_string(),
            Self::StatementEnd => "-- +tidemark StatementEnd".to_string(),
            Self::UnknownMarker(n) => format!("-- +tidemark Sideways{}", n),
            Self::Statement(n) => format!("INSERT INTO t VALUES ({});", n),
            Self::Fragment(n) => format!("UPDATE t SET v = {}", n),
            Self::Comment => "-- a comment".to_string(),
            Self::Blank => String::new(),
        }
    }

    fn is_section_marker(&self) -> bool {
        matches!(self, Self::Up | Self::Down)
    }
}

fuzz_target!(|lines: Vec<FuzzLine>| {
    let script = lines
        .iter()
        .map(FuzzLine::render)
        .collect::<Vec<_>>()
        .join("\n");

    if let Ok(parsed) = SqlScript::parse(&script) {
        // A script without section markers is always rejected
        assert!(lines.iter().any(FuzzLine::is_section_marker));
        assert!(parsed.up.iter().chain(&parsed.down).all(|s| !s.trim().is_empty()));
    }
});
