//! Fuzz target for the SQL migration script parser.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_sql_script
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use tidemark_migrate::SqlScript;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // The parser should never panic, only return errors
        let _ = SqlScript::parse(input);
    }
});
