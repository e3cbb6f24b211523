//! Logging bootstrap for the command-line tool.
//!
//! The library only emits through the `log` facade, as `event=<name>`
//! lines with `key=value` fields. The binary routes them to stderr so they
//! never interleave with the report on stdout.

use flexi_logger::{FlexiLoggerError, Logger, LoggerHandle};

pub const DEFAULT_LEVEL: &str = "warn";

const SUPPORTED_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Normalizes a bare level name; anything else is passed through as a
/// full `flexi_logger` spec (e.g. `genclock=debug`).
pub fn normalize_level(level: &str) -> String {
    let trimmed = level.trim();
    let lower = trimmed.to_ascii_lowercase();
    if SUPPORTED_LEVELS.contains(&lower.as_str()) {
        lower
    } else if trimmed.is_empty() {
        DEFAULT_LEVEL.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Starts logging to stderr. `RUST_LOG`, when set, takes precedence over `level`.
///
/// The returned handle must be kept alive for the duration of the program.
pub fn init_logging(level: &str) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_env_or_str(normalize_level(level))?
        .log_to_stderr()
        .format(flexi_logger::detailed_format)
        .start()
}
