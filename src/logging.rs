//! Tracing setup: terminal output, plus an optional daily-rolling log file.

use beacon_core::config::{shellexpand, BeaconConfig};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` wins over the configured level.
fn build_env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber.
///
/// With `to_file`, logs also go to `{data_dir}/logs/beacon.log.YYYY-MM-DD`.
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init(config: &BeaconConfig, to_file: bool) -> Option<WorkerGuard> {
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

    let (file_layer, guard) = if to_file {
        let log_dir = PathBuf::from(shellexpand(&config.data_dir)).join("logs");
        let appender = tracing_appender::rolling::daily(log_dir, "beacon.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .compact();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(build_env_filter(&config.log_level))
        .with(stdout_layer)
        .with(file_layer)
        .init();

    guard
}
