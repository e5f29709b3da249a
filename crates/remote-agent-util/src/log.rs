//! Logging setup, grounded on the `tracing` + `tracing-subscriber`
//! convention used throughout the pack (`casparian_mcp`, `xzatoma`); the
//! teacher's own `maelstrom_util::log` module wasn't among the retrieved
//! files, so its call site (`run_with_logger(level, |log| ...)` in
//! `maelstrom-run/src/main.rs`) is kept, but the body follows the wider
//! ecosystem convention instead.

use crate::config::LogLevel;
use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber at `level` (or `RUST_LOG`, if
/// set, which always wins) and run `body`. Mirrors the teacher's
/// "configure once, then hand control to a closure" shape.
pub fn run_with_logger<T>(level: LogLevel, body: impl FnOnce() -> T) -> T {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    body()
}
