use std::sync::Mutex;
use std::time::Duration;

use actix_web::web::Data;
use chrono::Utc;

use crate::queue::state::QueueState;

/// The timer-driven expiry pass: runs alongside the queue's HTTP server and
/// periodically expires stale unconfirmed tasks, reclaims in-flight tasks
/// whose worker stopped heartbeating, and drops retention-lapsed records.
pub async fn run_sweeper(
    state: Data<Mutex<QueueState>>,
    interval: Duration,
) -> Result<(), anyhow::Error> {
    loop {
        tokio::time::sleep(interval).await;
        let (stats, depths) = {
            let mut state = state.lock().unwrap();
            (state.sweep(Utc::now()), state.depths())
        };
        if stats.expired > 0 || stats.reclaimed > 0 {
            let (unconfirmed, runnable, in_flight, terminal) = depths;
            tracing::info!(
                expired = stats.expired,
                reclaimed = stats.reclaimed,
                unconfirmed,
                runnable,
                in_flight,
                terminal,
                "sweep pass"
            );
        }
    }
}
