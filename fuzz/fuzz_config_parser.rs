//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary text to `AppConfig::parse()`, then builds the model table
//! from any config that validates.

#![no_main]

use libfuzzer_sys::fuzz_target;
use parlance_core::context::ModelTable;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(config) = parlance_config::AppConfig::parse(s)
    {
        let _ = ModelTable::builtin().with_overrides(&config.models);
    }
});
