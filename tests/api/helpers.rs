use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use linkify::Link;
use linkify::LinkFinder;
use linkify::LinkKind;
use modelq::configuration::EmailClientSettings;
use modelq::configuration::QueueSettings;
use modelq::configuration::RegistrySettings;
use modelq::configuration::Settings;
use modelq::configuration::WebSettings;
use modelq::configuration::WorkerSettings;
use modelq::queue;
use modelq::registry::ModelRegistry;
use modelq::telemetry::get_subscriber;
use modelq::telemetry::init_subscriber;
use modelq::web;
use once_cell::sync::Lazy;
use secrecy::Secret;
use uuid::Uuid;
use wiremock::MockServer;

pub const TEST_SECRET: &str = "test-secret";

/// Init the tracing subscriber once only. To opt in to verbose test logs:
///
/// ```sh
///     TEST_LOG=true cargo test [test_name] | bunyan
/// ```
static TRACING: Lazy<()> = Lazy::new(|| {
    match std::env::var("TEST_LOG") {
        Ok(_) => {
            let subscriber = get_subscriber("test", "debug", std::io::stdout);
            init_subscriber(subscriber);
        }
        Err(_) => {
            let subscriber = get_subscriber("test", "debug", std::io::sink);
            init_subscriber(subscriber);
        }
    };
});

/// Write the test model descriptors into a fresh directory:
/// - `abmb_c` versions 1 and 2: a shell stand-in that copies its parameter
///   file to the declared attachment
/// - `always_fails` version 1: exits nonzero
pub fn seed_model_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("modelq-tests-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    for version in ["1", "2"] {
        std::fs::write(
            dir.join(format!("abmb_c_{version}.yaml")),
            format!(
                r#"
short_name: abmb_c
full_name: ABM-B
subtitle: Algorithmic BDF Model Bifacial
version: "{version}"
parameters:
  - name: nSamples
    description: Number of samples
    kind: integer
    default: 10000
    range_start: 1000
    range_end: 100000
  - name: wavelengths
    description: Wavelengths
    kind: range
    range_start: 400
    range_end: 2500
    units: nm
  - name: sieveDetourEffects
    description: Simulate sieve and detour effects
    kind: boolean
    default: true
attachments:
  - out.csv
executable: /bin/sh
arguments: ["-c", "cp params.json out.csv"]
"#
            ),
        )
        .unwrap();
    }
    std::fs::write(
        dir.join("always_fails.yaml"),
        r#"
short_name: always_fails
full_name: Always fails
version: "1"
parameters:
  - name: nSamples
    description: Number of samples
    kind: integer
    default: 10000
executable: /bin/sh
arguments: ["-c", "exit 3"]
"#,
    )
    .unwrap();
    dir
}

/// Settings with port 0 everywhere so the OS assigns free ports, and
/// timeouts long enough that nothing expires mid-test.
pub fn test_settings(model_dir: PathBuf) -> Settings {
    Settings {
        queue: QueueSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            request_secret: Secret::new(TEST_SECRET.to_string()),
            confirm_timeout_secs: 3600,
            heartbeat_timeout_secs: 600,
            terminal_retention_secs: 600,
            worker_liveness_window_secs: 60,
        },
        worker: WorkerSettings {
            poll_interval_secs: 1,
            error_sleep_secs: 1,
            max_errors: 3,
            keep_alive_interval_secs: 1,
            request_timeout_secs: 5,
            work_root: std::env::temp_dir().join(format!("modelq-work-{}", Uuid::new_v4())),
        },
        web: WebSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            base_url: "http://localhost".to_string(),
            keep_alive_timeout_secs: 60,
        },
        registry: RegistrySettings {
            model_dir,
            rescan_interval_secs: 3600,
        },
        email_client: EmailClientSettings {
            base_url: "http://127.0.0.1:0".to_string(),
            sender_email: "models@example.org".to_string(),
            authorization_token: Secret::new("token".to_string()),
            timeout_milliseconds: 2000,
        },
    }
}

pub struct QueueApp {
    pub addr: String,
}

/// Spawn the queue server (with its sweeper) on a random port.
pub async fn spawn_queue() -> QueueApp {
    Lazy::force(&TRACING);

    let cfg = test_settings(seed_model_dir());
    let registry = Arc::new(ModelRegistry::scan(&cfg.registry.model_dir).unwrap());
    let app = queue::Application::build(cfg, registry).await.unwrap();
    let addr = format!("http://127.0.0.1:{}", app.get_port());
    tokio::spawn(modelq::queue::sweeper::run_sweeper(
        app.state(),
        app.sweep_interval(),
    ));
    tokio::spawn(app.run_until_stopped());
    QueueApp { addr }
}

impl QueueApp {
    pub async fn create_task(
        &self,
        task_json: String,
    ) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/client_model_create", self.addr))
            .form(&[("task_json", task_json)])
            .send()
            .await
            .unwrap()
    }

    pub async fn confirm(
        &self,
        code: &str,
    ) -> reqwest::Response {
        reqwest::Client::new()
            .get(format!("{}/client_confirm/{code}", self.addr))
            .send()
            .await
            .unwrap()
    }

    pub async fn has_workers(&self) -> bool {
        let body: serde_json::Value = reqwest::Client::new()
            .get(format!("{}/client_queue_has_workers", self.addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        body["response"]["has_workers"].as_bool().unwrap()
    }

    pub async fn work_task_raw(
        &self,
        supported: serde_json::Value,
        secret: &str,
    ) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/worker_work_task", self.addr))
            .form(&[
                ("secret", secret.to_string()),
                ("model_versions_json", supported.to_string()),
            ])
            .send()
            .await
            .unwrap()
    }

    pub async fn work_task(
        &self,
        supported: serde_json::Value,
    ) -> serde_json::Value {
        let response = self.work_task_raw(supported, TEST_SECRET).await;
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.unwrap()
    }

    /// GET one of the per-task worker endpoints with the shared secret.
    pub async fn worker_get(
        &self,
        endpoint: &str,
        task_id: &str,
    ) -> serde_json::Value {
        let response = reqwest::Client::new()
            .get(format!("{}/{endpoint}/{task_id}", self.addr))
            .query(&[("secret", TEST_SECRET)])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.unwrap()
    }
}

/// A valid submission for the abmb_c test model.
pub fn submission_json(
    n_samples: i64,
    version: &str,
) -> String {
    serde_json::json!({
        "modelName": "abmb_c",
        "modelVersion": version,
        "emailAddress": "someone@example.org",
        "modelParameters": {
            "nSamples": {"type": "integer", "value": n_samples},
            "wavelengths": {"type": "range", "value": {"start": 400.0, "end": 2500.0}},
            "sieveDetourEffects": {"type": "boolean", "value": true}
        }
    })
    .to_string()
}

pub struct WebApp {
    pub addr: String,
    pub queue_server: MockServer,
    pub email_server: MockServer,
}

/// Spawn the web front-end on a random port, pointed at wiremock stand-ins
/// for the queue and the mail API.
pub async fn spawn_web() -> WebApp {
    Lazy::force(&TRACING);

    let queue_server = MockServer::start().await;
    let email_server = MockServer::start().await;

    let mut cfg = test_settings(seed_model_dir());
    let (queue_host, queue_port) = host_and_port(&queue_server.uri());
    cfg.queue.host = queue_host;
    cfg.queue.port = queue_port;
    cfg.email_client.base_url = email_server.uri();

    let registry = Arc::new(ModelRegistry::scan(&cfg.registry.model_dir).unwrap());
    let app = web::Application::build(cfg, registry, None).await.unwrap();
    let addr = format!("http://127.0.0.1:{}", app.get_port());
    tokio::spawn(app.run_until_stopped());

    WebApp {
        addr,
        queue_server,
        email_server,
    }
}

fn host_and_port(uri: &str) -> (String, u16) {
    let stripped = uri.strip_prefix("http://").unwrap();
    let (host, port) = stripped.split_once(':').unwrap();
    (host.to_string(), port.parse().unwrap())
}

impl WebApp {
    pub async fn get(
        &self,
        path: &str,
    ) -> reqwest::Response {
        reqwest::Client::new()
            .get(format!("{}{path}", self.addr))
            .send()
            .await
            .unwrap()
    }

    pub async fn post_model(
        &self,
        name: &str,
        form: &[(&str, &str)],
    ) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("{}/models/{name}", self.addr))
            .form(form)
            .send()
            .await
            .unwrap()
    }

    /// Extract the confirmation link from a captured email request.
    pub fn confirmation_link(
        &self,
        email_request: &wiremock::Request,
    ) -> String {
        let body: serde_json::Value = serde_json::from_slice(&email_request.body).unwrap();
        let text = body["TextBody"].as_str().unwrap();
        let links: Vec<Link> = LinkFinder::new()
            .links(text)
            .filter(|l| *l.kind() == LinkKind::Url)
            .collect();
        assert_eq!(links.len(), 1);
        links[0].as_str().to_owned()
    }
}

/// Remove a test directory, ignoring a directory that a test already
/// cleaned up itself.
pub fn cleanup_dir(dir: &Path) {
    let _ = std::fs::remove_dir_all(dir);
}
