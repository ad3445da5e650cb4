//! Tracing subscriber setup with format selection.

use anyhow::{Context, Result};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use super::{LogFormat, TracingConfig};

/// Install the global tracing subscriber.
///
/// An invalid filter falls back to `info`. Fails if a subscriber is
/// already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format() {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(config.include_location())
                    .with_line_number(config.include_location())
                    .with_target(config.include_target())
                    .with_thread_ids(config.include_thread_ids())
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_file(config.include_location())
                    .with_line_number(config.include_location())
                    .with_target(config.include_target())
                    .with_thread_ids(config.include_thread_ids()),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_file(config.include_location())
                    .with_line_number(config.include_location())
                    .with_target(config.include_target())
                    .with_thread_ids(config.include_thread_ids()),
            )
            .try_init(),
    }
    .context("Failed to initialize tracing subscriber")
}
