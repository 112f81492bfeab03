//! Output mode flags shared by the subcommands.
//!
//! `main` exports the global flags as environment variables so every
//! subcommand can check them without threading them through.

use serde::Serialize;

pub const JSON_ENV: &str = "LEADHARVEST_JSON";
pub const QUIET_ENV: &str = "LEADHARVEST_QUIET";

fn flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

/// Machine-readable output requested.
pub fn is_json() -> bool {
    flag(JSON_ENV)
}

/// Only errors and final results requested.
pub fn is_quiet() -> bool {
    flag(QUIET_ENV)
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => tracing::error!("failed to encode output: {e}"),
    }
}
