//! Subscriber setup for the `tracing` events emitted by the runtime.

use tracing_subscriber::EnvFilter;

/// Output format for [`init_logging_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install a global text subscriber.
///
/// `RUST_LOG` wins over `level`. Returns `false` when a subscriber was
/// already installed (by an earlier call or by the host application).
pub fn init_logging(level: &str) -> bool {
    init_logging_with(level, LogFormat::Text)
}

/// Install a global subscriber in the given format
pub fn init_logging_with(level: &str, format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(false);
    let installed = match format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };
    if installed {
        tracing::debug!(level, ?format, "logging initialized");
    }
    installed
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let _ = init_logging("debug");
        assert!(!init_logging("info"));
        assert!(!init_logging_with("info", LogFormat::Json));
    }
}
