//! Tracing/logging initialization.
//!
//! JSON lines on stdout, filtered by `RUST_LOG`. Session and connector events
//! carry `ticket` and `job` fields, so one exchange can be followed by
//! filtering on the ticket.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Initialize tracing with [`DEFAULT_DIRECTIVE`] as the fallback filter.
pub fn init() {
    init_with_default(DEFAULT_DIRECTIVE);
}

/// Initialize tracing, falling back to `directive` (e.g. `qbsync_jobs=debug`)
/// when `RUST_LOG` is not set. Returns `false` if a global subscriber was
/// already installed.
pub fn init_with_default(directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        assert!(!init_with_default("qbsync_jobs=debug"));
        ::tracing::info!(ticket = "t-1", "still logging after repeated init");
    }
}
