use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use modelq::configuration::get_configuration;
use modelq::email_client::EmailClient;
use modelq::queue_client::QueueClient;
use modelq::registry::run_rescan_loop;
use modelq::registry::ModelRegistry;
use modelq::telemetry::init_telemetry;
use modelq::utils::report_exit;
use modelq::worker::Worker;

/// Worker: polls the queue for confirmed tasks, runs the model executables,
/// and mails the results.
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
    init_telemetry("modelq-worker", &args.log_filename)?;

    let cfg = get_configuration(&args.config).context("could not load configuration")?;
    let registry = Arc::new(
        ModelRegistry::scan(&cfg.registry.model_dir).context("could not scan model directory")?,
    );

    let queue_client = QueueClient::new(
        cfg.queue.url(),
        cfg.queue.request_secret.clone(),
        cfg.worker.request_timeout(),
    );
    let sender = cfg
        .email_client
        .sender()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid sender address in configuration")?;
    let email_client = EmailClient::new(
        cfg.email_client.base_url.clone(),
        sender,
        cfg.email_client.authorization_token.clone(),
        cfg.email_client.timeout(),
    );

    let worker = Worker::new(
        queue_client,
        registry.clone(),
        email_client,
        cfg.worker.clone(),
    );
    tracing::info!("worker booted up, going into the polling loop");

    let rescan = run_rescan_loop(registry, cfg.registry.rescan_interval());
    let rescan_task = tokio::spawn(rescan);
    let worker_task = tokio::spawn(async move { worker.run().await });

    tokio::select! {
        o = worker_task => report_exit("worker loop", o),
        o = rescan_task => report_exit("model rescan", o),
    }

    Ok(())
}
