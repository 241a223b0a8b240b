use std::net::TcpListener;
use std::sync::Arc;
use std::sync::Mutex;

use actix_web::dev::Server;
use actix_web::web;
use actix_web::web::Data;
use actix_web::App;
use actix_web::HttpServer;
use tracing_actix_web::TracingLogger;

use crate::configuration::Settings;
use crate::email_client::EmailClient;
use crate::queue_client::QueueClient;
use crate::registry::ModelRegistry;
use crate::web::routes::confirm_submission;
use crate::web::routes::index;
use crate::web::routes::model_form;
use crate::web::routes::model_submit;
use crate::web::routes::AppBaseUrl;
use crate::web::routes::WorkerCheckCache;

/// Wrapper for actix's `Server` with access to the bound port.
pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    /// `client_port` (from `--client-port`) overrides the configured port.
    pub async fn build(
        cfg: Settings,
        registry: Arc<ModelRegistry>,
        client_port: Option<u16>,
    ) -> Result<Self, anyhow::Error> {
        let port = client_port.unwrap_or(cfg.web.port);
        let listener = TcpListener::bind(format!("{}:{}", cfg.web.host, port))?;
        let port = listener.local_addr().unwrap().port();

        let queue_client = QueueClient::new(
            cfg.queue.url(),
            cfg.queue.request_secret.clone(),
            cfg.worker.request_timeout(),
        );
        let sender = cfg
            .email_client
            .sender()
            .map_err(|e| anyhow::anyhow!(e))?;
        let email_client = EmailClient::new(
            cfg.email_client.base_url.clone(),
            sender,
            cfg.email_client.authorization_token.clone(),
            cfg.email_client.timeout(),
        );

        let server = run(listener, queue_client, email_client, registry, cfg)?;
        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 { self.port }

    /// Consumes `self`; the final call (or the argument to `tokio::spawn`).
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

/// Declare all front-end endpoints on an already-bound listener.
pub fn run(
    listener: TcpListener,
    queue_client: QueueClient,
    email_client: EmailClient,
    registry: Arc<ModelRegistry>,
    cfg: Settings,
) -> Result<Server, anyhow::Error> {
    let registry = Data::from(registry);
    let queue_client = Data::new(queue_client);
    let email_client = Data::new(email_client);
    let cache = Data::new(WorkerCheckCache(Mutex::new(None)));
    let base_url = Data::new(AppBaseUrl(cfg.web.base_url.clone()));
    let web_cfg = Data::new(cfg.web);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/", web::get().to(index))
            .route("/models/{name}", web::get().to(model_form))
            .route("/models/{name}", web::post().to(model_submit))
            .route("/confirm_submission/{code}", web::get().to(confirm_submission))
            .app_data(registry.clone())
            .app_data(queue_client.clone())
            .app_data(email_client.clone())
            .app_data(cache.clone())
            .app_data(base_url.clone())
            .app_data(web_cfg.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
