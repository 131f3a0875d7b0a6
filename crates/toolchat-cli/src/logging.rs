//! Tracing setup for the binary.
//!
//! Logs go to stderr; stdout carries only chat output.

use tracing_subscriber::EnvFilter;

/// Directive used with `--verbose`.
const VERBOSE_FILTER: &str =
    "warn,toolchat_core=debug,toolchat_mcp=debug,toolchat_agent=debug,toolchat_cli=debug";

/// Filter for this invocation: `--verbose` wins, then `RUST_LOG`, then `warn`.
pub fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

pub fn init_tracing(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr)
        .init();
}
