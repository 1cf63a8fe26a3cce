//! Diagnostics via `tracing` + `tracing-subscriber`.
//!
//! Everything goes to standard error; standard output carries only the
//! prompt and the `Running:` / `Exit code:` lines.
//!
//! Priority for the level:
//! 1. `--log-level` flag
//! 2. `BATCH_SHELL_LOG` environment variable
//! 3. `warn`

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

pub const LOG_ENV: &str = "BATCH_SHELL_LOG";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<Level>) -> Result<()> {
    let level = cli_level
        .or_else(|| std::env::var(LOG_ENV).ok().and_then(|s| parse_level_str(&s)))
        .unwrap_or(Level::WARN);

    fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing log subscriber: {e}"))
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
