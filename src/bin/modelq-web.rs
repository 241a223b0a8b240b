use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use modelq::configuration::get_configuration;
use modelq::registry::run_rescan_loop;
use modelq::registry::ModelRegistry;
use modelq::telemetry::init_telemetry;
use modelq::utils::report_exit;
use modelq::web::Application;

/// Web front-end: serves the model forms, forwards submissions to the
/// queue, and handles confirmation links.
#[derive(Parser)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// Log filename (use '-' for stdout)
    #[arg(short, long, default_value = "-")]
    log_filename: String,

    /// Http port for serving html (overrides the configured port)
    #[arg(short = 'p', long)]
    client_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_telemetry("modelq-web", &args.log_filename)?;

    let cfg = get_configuration(&args.config).context("could not load configuration")?;
    let registry = Arc::new(
        ModelRegistry::scan(&cfg.registry.model_dir).context("could not scan model directory")?,
    );
    let rescan_interval = cfg.registry.rescan_interval();

    let app = Application::build(cfg, registry.clone(), args.client_port).await?;
    tracing::info!("web front-end serving on port {}", app.get_port());

    let rescan = run_rescan_loop(registry, rescan_interval);
    let server_task = tokio::spawn(app.run_until_stopped());
    let rescan_task = tokio::spawn(rescan);

    tokio::select! {
        o = server_task => report_exit("web front-end", o),
        o = rescan_task => report_exit("model rescan", o),
    }

    Ok(())
}
