use std::fs::File;
use std::sync::Arc;

use tracing::subscriber::set_global_default;
use tracing::Subscriber;
use tracing_bunyan_formatter::BunyanFormattingLayer;
use tracing_bunyan_formatter::JsonStorageLayer;
use tracing_log::LogTracer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

/// Build a bunyan-formatted (JSON lines) subscriber. `RUST_LOG` overrides
/// `filter_level`. Note: `sink` must be a writer factory (e.g.
/// `std::io::stdout`), not a writer instance.
pub fn get_subscriber<Sink>(
    name: &str,
    filter_level: &str,
    sink: Sink,
) -> impl Subscriber
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_level));
    let fmt_layer = BunyanFormattingLayer::new(name.to_string(), sink);
    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(fmt_layer)
}

/// Start the logger and subscriber. This must run once, before any component
/// is built. `LogTracer` is required for `actix_web` logs to be captured by
/// the `Subscriber`.
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) {
    LogTracer::init().unwrap();
    set_global_default(subscriber).unwrap();
}

/// Wire up telemetry from the `--log-filename` flag: `-` logs to stdout,
/// anything else is created (truncated) and logged to as a file.
pub fn init_telemetry(
    name: &str,
    log_filename: &str,
) -> Result<(), anyhow::Error> {
    if log_filename == "-" {
        init_subscriber(get_subscriber(name, "info", std::io::stdout));
    } else {
        let file = File::create(log_filename)?;
        init_subscriber(get_subscriber(name, "info", Arc::new(file)));
    }
    Ok(())
}
