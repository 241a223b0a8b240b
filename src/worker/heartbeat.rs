use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::queue_client::QueueClient;

/// The keep-alive companion paired 1:1 with an in-flight task.
///
/// While the model executes, this periodically tells the queue we are still
/// alive so the task is not reclaimed. Heartbeat failures are counted for
/// diagnostics but never abort the run: if the queue really has forgotten
/// us, the pre-email ownership probe catches it.
///
/// Dropping the handle also stops the companion (the closed stop channel
/// wakes the loop), so every exit path from task execution shuts it down.
pub struct Heartbeat {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub fn start(
        client: QueueClient,
        task_id: Uuid,
        interval: Duration,
    ) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut consecutive_failures: u32 = 0;
            loop {
                tokio::select! {
                    // resolves on an explicit stop and when the sender drops
                    _ = stopped.changed() => break,
                    _ = tokio::time::sleep(interval) => {
                        match client.keep_alive(task_id).await {
                            Ok(true) => consecutive_failures = 0,
                            Ok(false) => {
                                tracing::warn!(%task_id, "queue no longer recognizes our task");
                            }
                            Err(e) => {
                                consecutive_failures += 1;
                                tracing::error!(
                                    error.cause_chain = ?e,
                                    %task_id,
                                    consecutive_failures,
                                    "heartbeat request failed"
                                );
                            }
                        }
                    }
                }
            }
            tracing::debug!(%task_id, "heartbeat companion stopped");
        });
        Self { stop, handle }
    }

    /// Signal the companion and wait for it to wind down.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}
