use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Registry,
};
use tracing_error::ErrorLayer;

use crate::config::Config;

/// Initializes the logging and tracing system.
///
/// Logs go to stderr so cleaned URLs on stdout stay pipeable.
/// - `development` (default): Pretty-printed, colored logs.
/// - `production`: JSON-formatted logs for aggregation.
pub fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("url_purifier=info"));

    let registry = Registry::default()
        .with(env_filter)
        .with(ErrorLayer::default());

    if config.is_production() {
        let json_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true);

        registry.with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true);

        registry.with(fmt_layer).init();
    }

    tracing::debug!(env = %config.app_env, "Logging system initialized");
}

/// Logs the execution time of a block when dropped.
pub struct Timer {
    label: &'static str,
    start: std::time::Instant,
}

impl Timer {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        tracing::debug!(
            label = %self.label,
            duration_ms = %duration.as_millis(),
            "Operation completed"
        );
    }
}
