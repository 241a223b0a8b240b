use std::net::TcpListener;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use actix_web::dev::Server;
use actix_web::web;
use actix_web::web::Data;
use actix_web::App;
use actix_web::HttpServer;
use tracing_actix_web::TracingLogger;

use crate::configuration::Settings;
use crate::queue::routes::client_confirm;
use crate::queue::routes::client_model_create;
use crate::queue::routes::client_queue_has_workers;
use crate::queue::routes::worker_failed_task;
use crate::queue::routes::worker_has_task;
use crate::queue::routes::worker_info;
use crate::queue::routes::worker_keep_alive_task;
use crate::queue::routes::worker_succeed_task;
use crate::queue::routes::worker_work_task;
use crate::queue::routes::RequestSecret;
use crate::queue::state::QueueState;
use crate::registry::ModelRegistry;

/// Wrapper for actix's `Server` with access to the bound port (the tests
/// bind port 0) and to the shared state the sweeper needs.
pub struct Application {
    port: u16,
    server: Server,
    state: Data<Mutex<QueueState>>,
    sweep_interval: Duration,
}

impl Application {
    pub async fn build(
        cfg: Settings,
        registry: Arc<ModelRegistry>,
    ) -> Result<Self, anyhow::Error> {
        let listener = TcpListener::bind(cfg.queue.address())?;
        let port = listener.local_addr().unwrap().port();

        let state = Data::new(Mutex::new(QueueState::new(
            cfg.queue.confirm_timeout(),
            cfg.queue.heartbeat_timeout(),
            cfg.queue.terminal_retention(),
            cfg.queue.worker_liveness_window(),
        )));

        let server = run(
            listener,
            state.clone(),
            registry,
            RequestSecret(cfg.queue.request_secret.clone()),
        )?;

        Ok(Self {
            port,
            server,
            state,
            sweep_interval: cfg.queue.sweep_interval(),
        })
    }

    pub fn get_port(&self) -> u16 { self.port }

    /// The shared queue state, for handing to the expiry sweeper.
    pub fn state(&self) -> Data<Mutex<QueueState>> { self.state.clone() }

    pub fn sweep_interval(&self) -> Duration { self.sweep_interval }

    /// Consumes `self`; the final call (or the argument to `tokio::spawn`).
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

/// Declare all queue endpoints on an already-bound listener.
pub fn run(
    listener: TcpListener,
    state: Data<Mutex<QueueState>>,
    registry: Arc<ModelRegistry>,
    secret: RequestSecret,
) -> Result<Server, anyhow::Error> {
    let registry = Data::from(registry);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/client_model_create", web::post().to(client_model_create))
            .route("/client_confirm/{code}", web::get().to(client_confirm))
            .route(
                "/client_queue_has_workers",
                web::get().to(client_queue_has_workers),
            )
            .route("/worker_info", web::get().to(worker_info))
            .route("/worker_work_task", web::post().to(worker_work_task))
            .route(
                "/worker_keep_alive_task/{task_id}",
                web::get().to(worker_keep_alive_task),
            )
            .route("/worker_has_task/{task_id}", web::get().to(worker_has_task))
            .route(
                "/worker_succeed_task/{task_id}",
                web::get().to(worker_succeed_task),
            )
            .route(
                "/worker_failed_task/{task_id}",
                web::get().to(worker_failed_task),
            )
            .app_data(state.clone())
            .app_data(registry.clone())
            .app_data(Data::new(secret.clone()))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
