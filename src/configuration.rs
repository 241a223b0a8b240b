use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use secrecy::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::domain::EmailAddress;

/// Top-level configuration, shared by all three binaries. Each process reads
/// only the sections it needs, but loading the whole file everywhere keeps a
/// single source of truth for the queue address and the shared secret.
#[derive(Deserialize, Clone)]
pub struct Settings {
    pub queue: QueueSettings,
    pub worker: WorkerSettings,
    pub web: WebSettings,
    pub registry: RegistrySettings,
    pub email_client: EmailClientSettings,
}

/// Queue server configuration. `host`/`port` double as the bind address of
/// the queue binary and the address workers and the web front-end dial.
#[derive(Deserialize, Clone)]
pub struct QueueSettings {
    pub host: String,
    // numbers must also deserialize from strings so that environment
    // overrides (which are always strings) keep working
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    /// Shared secret required on every `worker_*` endpoint
    pub request_secret: Secret<String>,
    /// How long an unconfirmed task may wait for its confirmation click
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub confirm_timeout_secs: u64,
    /// How long an in-flight task may go without a heartbeat before it is
    /// reclaimed
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub heartbeat_timeout_secs: u64,
    /// How long terminal (done/failed) records are kept for idempotent acks
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub terminal_retention_secs: u64,
    /// Sliding window within which a worker poll counts as "we have workers";
    /// should be roughly twice the worker poll interval
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub worker_liveness_window_secs: u64,
}

impl QueueSettings {
    pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

    pub fn url(&self) -> String { format!("http://{}:{}", self.host, self.port) }

    pub fn confirm_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.confirm_timeout_secs as i64)
    }

    pub fn heartbeat_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_timeout_secs as i64)
    }

    pub fn terminal_retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.terminal_retention_secs as i64)
    }

    pub fn worker_liveness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.worker_liveness_window_secs as i64)
    }

    /// Cadence of the expiry sweeper: a quarter of the shortest timeout it
    /// enforces, with a one second floor.
    pub fn sweep_interval(&self) -> Duration {
        let quarter = self.confirm_timeout_secs.min(self.heartbeat_timeout_secs) / 4;
        Duration::from_secs(quarter.max(1))
    }
}

/// Worker configuration.
#[derive(Deserialize, Clone)]
pub struct WorkerSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub poll_interval_secs: u64,
    /// Sleep after a transport or decode error before re-polling
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub error_sleep_secs: u64,
    /// Consecutive-error threshold after which errors are escalated to
    /// warnings; the worker keeps polling regardless
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_errors: u32,
    /// Heartbeat cadence; must be well below the queue's heartbeat timeout
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub keep_alive_interval_secs: u64,
    /// Bound on any single HTTP exchange with the queue
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_secs: u64,
    /// Parent directory for per-task working directories
    pub work_root: PathBuf,
}

impl WorkerSettings {
    pub fn poll_interval(&self) -> Duration { Duration::from_secs(self.poll_interval_secs) }

    pub fn error_sleep(&self) -> Duration { Duration::from_secs(self.error_sleep_secs) }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }
}

/// Web front-end configuration.
#[derive(Deserialize, Clone)]
pub struct WebSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    /// Public URL prefix used when building confirmation links
    pub base_url: String,
    /// How long a successful workers-available probe is trusted before the
    /// queue is asked again
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub keep_alive_timeout_secs: u64,
}

impl WebSettings {
    pub fn keep_alive_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.keep_alive_timeout_secs as i64)
    }
}

/// Model registry configuration.
#[derive(Deserialize, Clone)]
pub struct RegistrySettings {
    /// Directory scanned for `*.yaml` model descriptors
    pub model_dir: PathBuf,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub rescan_interval_secs: u64,
}

impl RegistrySettings {
    pub fn rescan_interval(&self) -> Duration { Duration::from_secs(self.rescan_interval_secs) }
}

/// Outbound mail transport (Postmark-shaped HTTP API).
#[derive(Deserialize, Clone)]
pub struct EmailClientSettings {
    pub base_url: String,
    pub sender_email: String,
    pub authorization_token: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

impl EmailClientSettings {
    pub fn sender(&self) -> Result<EmailAddress, String> {
        EmailAddress::parse(self.sender_email.clone())
    }

    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_milliseconds) }
}

/// Load configuration from the file given on the command line, then layer
/// `MODELQ_`-prefixed environment variables on top (e.g.
/// `MODELQ_QUEUE__REQUEST_SECRET` overrides `queue.request_secret`).
/// All fields without a default must be present, otherwise startup fails
/// immediately.
pub fn get_configuration(path: &Path) -> Result<Settings, ConfigError> {
    let settings = Config::builder()
        .add_source(config::File::from(path))
        .add_source(
            config::Environment::with_prefix("MODELQ")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize()
}
