//! Fuzz target for the `dbconf.toml` parser.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_dbconf_parser
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::path::Path;
use tidemark_cli::config::DbConf;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = DbConf::parse(input, "development", Path::new("/"), |_| None);
    }
});
