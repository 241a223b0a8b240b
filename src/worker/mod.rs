//! The worker: poll the queue, execute one task at a time, heartbeat while
//! running, mail the results, acknowledge the outcome.
//!
//! A worker is stateless across tasks. The only concurrency is the
//! heartbeat companion; the model's child process is the one blocking call
//! made voluntarily while a task is held.

pub mod execution;
pub mod heartbeat;

use std::sync::Arc;

use uuid::Uuid;

use crate::configuration::WorkerSettings;
use crate::domain::Task;
use crate::email_client::EmailClient;
use crate::queue_client::QueueClient;
use crate::queue_client::WorkOutcome;
use crate::registry::ModelRegistry;
use crate::worker::execution::run_model;
use crate::worker::heartbeat::Heartbeat;

pub struct Worker {
    queue: QueueClient,
    registry: Arc<ModelRegistry>,
    email_client: EmailClient,
    settings: WorkerSettings,
}

impl Worker {
    pub fn new(
        queue: QueueClient,
        registry: Arc<ModelRegistry>,
        email_client: EmailClient,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            registry,
            email_client,
            settings,
        }
    }

    /// The main loop. Never returns under normal operation: transport
    /// errors are slept through and retried so the worker survives queue
    /// server restarts.
    pub async fn run(&self) -> Result<(), anyhow::Error> {
        match self.queue.info().await {
            Ok(()) => tracing::info!("got initial response from the queue server"),
            Err(e) => tracing::error!(
                error.cause_chain = ?e,
                "queue server unreachable at boot; polling anyway"
            ),
        }

        let mut consecutive_errors: u32 = 0;
        loop {
            // the registry may have been rescanned since the last poll
            let supported = self.registry.versions();
            match self.queue.work_task(&supported).await {
                Ok(WorkOutcome::Task(wire_task)) => {
                    consecutive_errors = 0;
                    self.process_task(wire_task).await;
                }
                Ok(WorkOutcome::EmptyQueue) => {
                    consecutive_errors = 0;
                    tracing::debug!("no tasks available on the queue");
                    tokio::time::sleep(self.settings.poll_interval()).await;
                }
                Ok(WorkOutcome::NoVersion) => {
                    consecutive_errors = 0;
                    tracing::info!("queue has tasks, but none for our model versions");
                    tokio::time::sleep(self.settings.poll_interval()).await;
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors > self.settings.max_errors {
                        tracing::warn!(
                            error.cause_chain = ?e,
                            consecutive_errors,
                            "queue still unreachable"
                        );
                    } else {
                        tracing::error!(
                            error.cause_chain = ?e,
                            consecutive_errors,
                            "error polling the queue"
                        );
                    }
                    tokio::time::sleep(self.settings.error_sleep()).await;
                }
            }
        }
    }

    /// Execute one handed-out task end to end.
    ///
    /// The task arrives as raw JSON so that its id can be salvaged even
    /// when the rest fails to deserialize; a malformed task is reported as
    /// failed rather than crashing the loop.
    #[tracing::instrument(name = "Processing task", skip_all)]
    pub async fn process_task(
        &self,
        wire_task: serde_json::Value,
    ) {
        let task_id: Option<Uuid> = wire_task
            .get("taskId")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok());

        let task: Task = match serde_json::from_value(wire_task) {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(error.cause_chain = ?e, "could not deserialize handed-out task");
                if let Some(task_id) = task_id {
                    self.ack_failed(task_id).await;
                }
                return;
            }
        };
        tracing::info!(task_id = %task.task_id, model = %task.model_name, "starting model run");

        let spec = match self.registry.get(&task.model_name, &task.model_version) {
            Some(spec) => spec,
            None => {
                tracing::warn!(
                    model = %task.model_name,
                    version = %task.model_version,
                    "handed a task for a model we do not have"
                );
                self.ack_failed(task.task_id).await;
                return;
            }
        };

        let working_directory = self.settings.work_root.join(task.task_id.to_string());
        if let Err(e) = tokio::fs::create_dir_all(&working_directory).await {
            tracing::error!(error.cause_chain = ?e, "could not create working directory");
            self.ack_failed(task.task_id).await;
            return;
        }

        let heartbeat = Heartbeat::start(
            self.queue.clone(),
            task.task_id,
            self.settings.keep_alive_interval(),
        );

        match run_model(&spec, &task, &working_directory).await {
            Ok(output) => {
                // another worker may own the task by now (e.g. we were
                // reclaimed after a stall); the queue's answer decides who
                // sends the result mail
                match self.queue.has_task(task.task_id).await {
                    Ok(true) => {
                        let subject = format!("Model run results: {}", spec.full_name);
                        if let Err(e) = self
                            .email_client
                            .send_email(
                                &task.email_address,
                                &subject,
                                &output.report,
                                &output.attachments,
                            )
                            .await
                        {
                            // the model did run; a lost mail is not worth
                            // re-executing it
                            tracing::error!(
                                error.cause_chain = ?e,
                                "result email failed; task still counts as succeeded"
                            );
                        }
                        self.ack_succeed(task.task_id).await;
                    }
                    Ok(false) => {
                        tracing::warn!("queue reassigned our task; skipping email and ack");
                    }
                    Err(e) => {
                        tracing::error!(
                            error.cause_chain = ?e,
                            "could not verify task ownership; skipping email and ack"
                        );
                    }
                }
            }
            Err(e) => {
                tracing::error!(error.cause_chain = ?e, "model run failed");
                self.ack_failed(task.task_id).await;
            }
        }

        heartbeat.stop().await;

        if let Err(e) = tokio::fs::remove_dir_all(&working_directory).await {
            tracing::warn!(error.cause_chain = ?e, "could not remove working directory");
        }
    }

    async fn ack_succeed(
        &self,
        task_id: Uuid,
    ) {
        match self.queue.succeed_task(task_id).await {
            Ok(()) => tracing::info!(%task_id, "task acknowledged as succeeded"),
            Err(e) => {
                tracing::error!(error.cause_chain = ?e, %task_id, "could not acknowledge success")
            }
        }
    }

    async fn ack_failed(
        &self,
        task_id: Uuid,
    ) {
        match self.queue.failed_task(task_id).await {
            Ok(()) => tracing::info!(%task_id, "task acknowledged as failed"),
            Err(e) => {
                tracing::error!(error.cause_chain = ?e, %task_id, "could not acknowledge failure")
            }
        }
    }
}
