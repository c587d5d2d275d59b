//! Logging configuration using tracing

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging subsystem.
///
/// Logs go to stderr, where the enclosing test runner captures them.
/// Log level is controlled by the `BUILDMON_LOG` environment variable.
///
/// # Examples
/// ```bash
/// BUILDMON_LOG=debug cargo test
/// BUILDMON_LOG=trace cargo test
/// ```
///
/// Safe to call more than once; subsequent calls are no-ops.
pub fn init() {
    // Default to info, allow override via BUILDMON_LOG
    let env_filter = EnvFilter::try_from_env("BUILDMON_LOG")
        .unwrap_or_else(|_| EnvFilter::new("buildmon=info,warn"));

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .try_init();

    if result.is_ok() {
        tracing::debug!("buildmon logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
    }
}
