use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use modelq::configuration::get_configuration;
use modelq::queue::sweeper::run_sweeper;
use modelq::queue::Application;
use modelq::registry::run_rescan_loop;
use modelq::registry::ModelRegistry;
use modelq::telemetry::init_telemetry;
use modelq::utils::report_exit;

/// Queue server: holds the authoritative task registry and mediates between
/// submitters and workers.
#[derive(Parser)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// Log filename (use '-' for stdout)
    #[arg(short, long, default_value = "-")]
    log_filename: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_telemetry("modelq-queue", &args.log_filename)?;

    let cfg = get_configuration(&args.config).context("could not load configuration")?;
    let registry = Arc::new(
        ModelRegistry::scan(&cfg.registry.model_dir).context("could not scan model directory")?,
    );
    let rescan_interval = cfg.registry.rescan_interval();

    let app = Application::build(cfg, registry.clone()).await?;
    tracing::info!("queue server listening on port {}", app.get_port());

    let sweeper = run_sweeper(app.state(), app.sweep_interval());
    let rescan = run_rescan_loop(registry, rescan_interval);

    let server_task = tokio::spawn(app.run_until_stopped());
    let sweeper_task = tokio::spawn(sweeper);
    let rescan_task = tokio::spawn(rescan);

    tokio::select! {
        o = server_task => report_exit("queue API", o),
        o = sweeper_task => report_exit("expiry sweeper", o),
        o = rescan_task => report_exit("model rescan", o),
    }

    Ok(())
}
