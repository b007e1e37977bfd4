//! Tracing subscriber setup

use tracing::Level;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose events are shown at the requested level
const CONSOLE_TARGETS: &[&str] = &["ubm", "ubm_core", "ubm_http", "ubm_frontend_common"];

/// Build the filter directive used when `RUST_LOG` is not set
pub fn default_directive(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    CONSOLE_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install a stderr subscriber; `RUST_LOG` overrides `level`
///
/// Installing twice is harmless: the second attempt is ignored.
pub fn init_tracing(level: Level, json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
