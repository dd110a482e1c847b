//! Logging setup shared by `tunnelctl` and `tunnelctl-setup`.
//!
//! Diagnostics always go to stderr. Stdout belongs to command results (rule
//! tables, `--json` documents, streamed remote install output), so a caller
//! can pipe `tunnelctl relay list --json` into another tool with logging on.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter from `RUST_LOG`, or `default_filter` when it is unset or does not
/// parse.
fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the global subscriber. `log_json` switches stderr lines to JSON
/// for log shippers. A second call is a no-op.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let registry = tracing_subscriber::registry().with(env_filter(default_filter));

    let installed = if log_json {
        registry.with(stderr.json()).try_init()
    } else {
        registry.with(stderr).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_applies_without_rust_log() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(env_filter("tunnelctl=debug").to_string(), "tunnelctl=debug");
        }
    }

    #[test]
    fn repeated_init_does_not_panic() {
        init_tracing("warn", false);
        init_tracing("warn", true);
    }
}
