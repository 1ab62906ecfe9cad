//! Fuzz target for migration file name parsing.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_migration_name
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use tidemark_migrate::parse_migration_name;

fuzz_target!(|name: &str| {
    if let Ok(Some(parsed)) = parse_migration_name(name) {
        // Accepted names always carry a positive version
        assert!(parsed.version > 0);
        assert!(name.starts_with(&parsed.version.to_string()) || name.starts_with('0'));
    }
});
