//! HTTP client for the queue server's API, shared by the web front-end and
//! the workers. One `reqwest::Client` per process; cloning this struct
//! reuses the underlying connection pool.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::Task;

#[derive(Debug, thiserror::Error)]
pub enum QueueClientError {
    #[error("could not reach the queue server")]
    Transport(#[from] reqwest::Error),
    /// The queue refused the request (e.g. submit-side validation); the
    /// message is the queue's own wording, fit to show the submitter.
    #[error("{0}")]
    Rejected(String),
    #[error("malformed response from the queue server: {0}")]
    Malformed(String),
}

/// What a poll came back with. The two empty cases stay distinct for
/// logging. The task is kept as raw JSON: the worker extracts the id first
/// so that a malformed task can still be failed by id.
#[derive(Debug)]
pub enum WorkOutcome {
    Task(serde_json::Value),
    EmptyQueue,
    NoVersion,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfirmStatus {
    Okay,
    Expired,
    NotFound,
}

#[derive(Clone)]
pub struct QueueClient {
    http_client: Client,
    base_url: String,
    secret: Secret<String>,
}

#[derive(Deserialize)]
struct CreateEnvelope {
    response: CreateResponse,
}

#[derive(Deserialize)]
struct CreateResponse {
    code: String,
    task: Task,
}

#[derive(Deserialize)]
struct ResponseEnvelope {
    response: String,
}

#[derive(Deserialize)]
struct HasWorkersEnvelope {
    response: HasWorkersResponse,
}

#[derive(Deserialize)]
struct HasWorkersResponse {
    has_workers: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WorkEnvelope {
    Task { task: serde_json::Value },
    Status { status: String },
}

impl QueueClient {
    pub fn new(
        base_url: String,
        secret: Secret<String>,
        timeout: Duration,
    ) -> Self {
        let http_client = Client::builder().timeout(timeout).build().unwrap();
        Self {
            http_client,
            base_url,
            secret,
        }
    }

    /// Submit a task for queuing; returns the confirmation code and the
    /// task stamped with its assigned id.
    pub async fn create_task(
        &self,
        task: &Task,
    ) -> Result<(String, Task), QueueClientError> {
        let task_json = serde_json::to_string(task)
            .map_err(|e| QueueClientError::Malformed(e.to_string()))?;
        let response = self
            .http_client
            .post(format!("{}/client_model_create", self.base_url))
            .form(&[("task_json", task_json)])
            .send()
            .await?;

        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(QueueClientError::Rejected(message));
        }
        let envelope: CreateEnvelope = response
            .json()
            .await
            .map_err(|e| QueueClientError::Malformed(e.to_string()))?;
        Ok((envelope.response.code, envelope.response.task))
    }

    pub async fn confirm(
        &self,
        code: &str,
    ) -> Result<ConfirmStatus, QueueClientError> {
        let response = self
            .http_client
            .get(format!("{}/client_confirm/{code}", self.base_url))
            .send()
            .await?;
        // "notfound" arrives with a 404, so the body is parsed regardless
        // of the status code
        let envelope: ResponseEnvelope = response
            .json()
            .await
            .map_err(|e| QueueClientError::Malformed(e.to_string()))?;
        match envelope.response.as_str() {
            "okay" => Ok(ConfirmStatus::Okay),
            "expired" => Ok(ConfirmStatus::Expired),
            "notfound" => Ok(ConfirmStatus::NotFound),
            other => Err(QueueClientError::Malformed(format!(
                "unexpected confirm response {other:?}"
            ))),
        }
    }

    pub async fn has_workers(&self) -> Result<bool, QueueClientError> {
        let envelope: HasWorkersEnvelope = self
            .http_client
            .get(format!("{}/client_queue_has_workers", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| QueueClientError::Malformed(e.to_string()))?;
        Ok(envelope.response.has_workers)
    }

    /// Boot-time health probe. A misconfigured secret is answered in the
    /// body, so the body is checked rather than the status code alone.
    pub async fn info(&self) -> Result<(), QueueClientError> {
        let envelope: ResponseEnvelope = self
            .http_client
            .get(format!("{}/worker_info", self.base_url))
            .query(&[("secret", self.secret.expose_secret())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| QueueClientError::Malformed(e.to_string()))?;
        match envelope.response.as_str() {
            "okay" => Ok(()),
            other => Err(QueueClientError::Malformed(format!(
                "unexpected info response {other:?}"
            ))),
        }
    }

    /// Ask for work, announcing which (model, version) pairs we support.
    pub async fn work_task(
        &self,
        supported: &HashMap<String, Vec<String>>,
    ) -> Result<WorkOutcome, QueueClientError> {
        let versions_json = serde_json::to_string(supported)
            .map_err(|e| QueueClientError::Malformed(e.to_string()))?;
        let envelope: WorkEnvelope = self
            .http_client
            .post(format!("{}/worker_work_task", self.base_url))
            .form(&[
                ("secret", self.secret.expose_secret().as_str()),
                ("model_versions_json", &versions_json),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| QueueClientError::Malformed(e.to_string()))?;
        match envelope {
            WorkEnvelope::Task { task } => Ok(WorkOutcome::Task(task)),
            WorkEnvelope::Status { status } => match status.as_str() {
                "empty_queue" => Ok(WorkOutcome::EmptyQueue),
                "no_version" => Ok(WorkOutcome::NoVersion),
                other => Err(QueueClientError::Malformed(format!(
                    "unexpected poll status {other:?}"
                ))),
            },
        }
    }

    async fn yes_no(
        &self,
        endpoint: &str,
        task_id: Uuid,
    ) -> Result<bool, QueueClientError> {
        let envelope: ResponseEnvelope = self
            .http_client
            .get(format!("{}/{endpoint}/{task_id}", self.base_url))
            .query(&[("secret", self.secret.expose_secret())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| QueueClientError::Malformed(e.to_string()))?;
        match envelope.response.as_str() {
            "yes" => Ok(true),
            "no" => Ok(false),
            other => Err(QueueClientError::Malformed(format!(
                "unexpected yes/no response {other:?}"
            ))),
        }
    }

    /// Heartbeat; `false` means the queue no longer considers us the owner.
    pub async fn keep_alive(
        &self,
        task_id: Uuid,
    ) -> Result<bool, QueueClientError> {
        self.yes_no("worker_keep_alive_task", task_id).await
    }

    /// Ownership probe, checked before committing to the result email.
    pub async fn has_task(
        &self,
        task_id: Uuid,
    ) -> Result<bool, QueueClientError> {
        self.yes_no("worker_has_task", task_id).await
    }

    async fn ack(
        &self,
        endpoint: &str,
        task_id: Uuid,
    ) -> Result<(), QueueClientError> {
        let envelope: ResponseEnvelope = self
            .http_client
            .get(format!("{}/{endpoint}/{task_id}", self.base_url))
            .query(&[("secret", self.secret.expose_secret())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| QueueClientError::Malformed(e.to_string()))?;
        match envelope.response.as_str() {
            "okay" => Ok(()),
            other => Err(QueueClientError::Malformed(format!(
                "unexpected ack response {other:?}"
            ))),
        }
    }

    pub async fn succeed_task(
        &self,
        task_id: Uuid,
    ) -> Result<(), QueueClientError> {
        self.ack("worker_succeed_task", task_id).await
    }

    pub async fn failed_task(
        &self,
        task_id: Uuid,
    ) -> Result<(), QueueClientError> {
        self.ack("worker_failed_task", task_id).await
    }
}
