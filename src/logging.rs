//! # Structured Logging
//!
//! Environment-aware tracing initialization. Respects `RUST_LOG` when set,
//! otherwise derives a default level from `CASCADE_ENV`. `CASCADE_LOG_FORMAT=json`
//! switches to JSON output for log shippers.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process. Safe to call from
/// multiple entry points; later calls and pre-installed subscribers are
/// tolerated.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level(&environment)));

        let json_format = std::env::var("CASCADE_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let result = if json_format {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .json()
                .try_init()
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .try_init()
        };

        if result.is_err() {
            // A global subscriber is already installed; keep using it.
            tracing::debug!("Global tracing subscriber already initialized");
        } else {
            tracing::debug!(environment = %environment, "Structured logging initialized");
        }
    });
}

fn environment() -> String {
    std::env::var("CASCADE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn default_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}
