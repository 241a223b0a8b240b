//! The authoritative task registry.
//!
//! Four indexed collections, one per live state: unconfirmed tasks by
//! confirmation code, runnable tasks as a FIFO queue, in-flight tasks by
//! task id, and a short-retention terminal map that keeps success/failure
//! acks idempotent. Expired confirmation codes are kept for a while so the
//! confirm endpoint can answer "expired" rather than "notfound".
//!
//! Every method takes `now` as an argument; nothing in here reads the
//! clock. The sweeper and the HTTP handlers pass `Utc::now()`, tests pass
//! whatever instant they need.
//!
//! All mutation happens under one `Mutex` held by the HTTP layer, one lock
//! acquisition per operation, so no partial update is ever observable.

use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::thread_rng;
use rand::Rng;
use uuid::Uuid;

use crate::domain::Task;
use crate::domain::TaskState;

/// A task plus the queue-side bookkeeping that drives its expiry.
#[derive(Debug, Clone)]
struct QueuedTask {
    task: Task,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    last_heartbeat_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
struct TerminalRecord {
    outcome: TaskState,
    at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct ExpiredRecord {
    task_id: Uuid,
    at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Okay,
    Expired,
    NotFound,
}

#[derive(Debug, PartialEq)]
pub enum PollOutcome {
    /// A matching task, now in flight and assigned to the caller
    Task(Task),
    /// Runnable tasks exist but none matches the caller's versions
    NoVersion,
    EmptyQueue,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub expired: usize,
    pub reclaimed: usize,
    pub dropped: usize,
}

pub struct QueueState {
    confirm_timeout: Duration,
    heartbeat_timeout: Duration,
    terminal_retention: Duration,
    worker_liveness_window: Duration,
    unconfirmed: HashMap<String, QueuedTask>,
    expired: HashMap<String, ExpiredRecord>,
    runnable: VecDeque<QueuedTask>,
    in_flight: HashMap<Uuid, QueuedTask>,
    terminal: HashMap<Uuid, TerminalRecord>,
    last_worker_poll: Option<DateTime<Utc>>,
}

impl QueueState {
    pub fn new(
        confirm_timeout: Duration,
        heartbeat_timeout: Duration,
        terminal_retention: Duration,
        worker_liveness_window: Duration,
    ) -> Self {
        Self {
            confirm_timeout,
            heartbeat_timeout,
            terminal_retention,
            worker_liveness_window,
            unconfirmed: HashMap::new(),
            expired: HashMap::new(),
            runnable: VecDeque::new(),
            in_flight: HashMap::new(),
            terminal: HashMap::new(),
            last_worker_poll: None,
        }
    }

    /// Accept a validated task: assign its id and confirmation code, hold it
    /// unconfirmed. Returns the code and the stamped task.
    pub fn submit(
        &mut self,
        mut task: Task,
        now: DateTime<Utc>,
    ) -> (String, Task) {
        task.task_id = Uuid::new_v4();
        let code = loop {
            let candidate = generate_confirmation_code();
            if !self.unconfirmed.contains_key(&candidate) && !self.expired.contains_key(&candidate)
            {
                break candidate;
            }
        };
        self.unconfirmed.insert(
            code.clone(),
            QueuedTask {
                task: task.clone(),
                created_at: now,
                confirmed_at: None,
                last_heartbeat_at: None,
            },
        );
        (code, task)
    }

    /// Consume a confirmation code, releasing its task into the runnable
    /// queue in FIFO arrival order. A code is single-use: a second confirm
    /// reports `NotFound`, a lapsed one `Expired`.
    pub fn confirm(
        &mut self,
        code: &str,
        now: DateTime<Utc>,
    ) -> ConfirmOutcome {
        match self.unconfirmed.remove(code) {
            Some(mut queued) => {
                queued.confirmed_at = Some(now);
                self.runnable.push_back(queued);
                ConfirmOutcome::Okay
            }
            None if self.expired.contains_key(code) => ConfirmOutcome::Expired,
            None => ConfirmOutcome::NotFound,
        }
    }

    /// Hand out the first runnable task whose (model, version) the caller
    /// supports, marking it in flight with its heartbeat clock started.
    /// The poll itself is recorded for `has_workers`, whatever the outcome.
    pub fn poll(
        &mut self,
        supported: &HashMap<String, Vec<String>>,
        now: DateTime<Utc>,
    ) -> PollOutcome {
        self.last_worker_poll = Some(now);
        if self.runnable.is_empty() {
            return PollOutcome::EmptyQueue;
        }
        let position = self.runnable.iter().position(|queued| {
            supported
                .get(&queued.task.model_name)
                .map(|versions| versions.iter().any(|v| *v == queued.task.model_version))
                .unwrap_or(false)
        });
        match position {
            None => PollOutcome::NoVersion,
            Some(i) => {
                // remove() cannot fail: `i` came from position()
                let mut queued = self.runnable.remove(i).unwrap();
                queued.last_heartbeat_at = Some(now);
                let task = queued.task.clone();
                self.in_flight.insert(task.task_id, queued);
                PollOutcome::Task(task)
            }
        }
    }

    /// Refresh an in-flight task's heartbeat. `false` means we no longer
    /// consider the caller the owner (expired, reclaimed, or completed).
    pub fn heartbeat(
        &mut self,
        task_id: Uuid,
        now: DateTime<Utc>,
    ) -> bool {
        match self.in_flight.get_mut(&task_id) {
            Some(queued) => {
                queued.last_heartbeat_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Pure ownership probe, used by workers before they commit to mailing
    /// results.
    pub fn has_task(
        &self,
        task_id: Uuid,
    ) -> bool {
        self.in_flight.contains_key(&task_id)
    }

    pub fn succeed(
        &mut self,
        task_id: Uuid,
        now: DateTime<Utc>,
    ) {
        self.finish(task_id, TaskState::Done, now)
    }

    pub fn fail(
        &mut self,
        task_id: Uuid,
        now: DateTime<Utc>,
    ) {
        self.finish(task_id, TaskState::Failed, now)
    }

    /// Terminal acks are idempotent: an ack for a task that is no longer in
    /// flight (already acked, or reclaimed and acked by another worker) is a
    /// silent no-op. The first ack wins.
    fn finish(
        &mut self,
        task_id: Uuid,
        outcome: TaskState,
        now: DateTime<Utc>,
    ) {
        if self.in_flight.remove(&task_id).is_some() {
            self.terminal
                .insert(task_id, TerminalRecord { outcome, at: now });
        }
    }

    /// Whether any worker has polled within the liveness window.
    pub fn has_workers(
        &self,
        now: DateTime<Utc>,
    ) -> bool {
        self.last_worker_poll
            .map(|at| now - at <= self.worker_liveness_window)
            .unwrap_or(false)
    }

    /// Timer-driven pass over the timed-out collections:
    /// - unconfirmed tasks older than the confirmation timeout expire;
    /// - in-flight tasks with a lapsed heartbeat are reclaimed to the *head*
    ///   of the runnable queue (a reclaim is not a new submission);
    /// - expired codes and terminal records past retention are dropped.
    pub fn sweep(
        &mut self,
        now: DateTime<Utc>,
    ) -> SweepStats {
        let mut stats = SweepStats::default();

        let lapsed: Vec<String> = self
            .unconfirmed
            .iter()
            .filter(|(_, queued)| now - queued.created_at > self.confirm_timeout)
            .map(|(code, _)| code.clone())
            .collect();
        for code in lapsed {
            let queued = self.unconfirmed.remove(&code).unwrap();
            self.expired.insert(
                code,
                ExpiredRecord {
                    task_id: queued.task.task_id,
                    at: now,
                },
            );
            stats.expired += 1;
        }

        let lost: Vec<Uuid> = self
            .in_flight
            .iter()
            .filter(|(_, queued)| {
                queued
                    .last_heartbeat_at
                    .map(|at| now - at > self.heartbeat_timeout)
                    .unwrap_or(true)
            })
            .map(|(id, _)| *id)
            .collect();
        for task_id in lost {
            let mut queued = self.in_flight.remove(&task_id).unwrap();
            queued.last_heartbeat_at = None;
            self.runnable.push_front(queued);
            stats.reclaimed += 1;
        }

        let stale_codes: Vec<String> = self
            .expired
            .iter()
            .filter(|(_, record)| now - record.at > self.confirm_timeout)
            .map(|(code, _)| code.clone())
            .collect();
        for code in stale_codes {
            self.expired.remove(&code);
            stats.dropped += 1;
        }
        let stale_terminal: Vec<Uuid> = self
            .terminal
            .iter()
            .filter(|(_, record)| now - record.at > self.terminal_retention)
            .map(|(id, _)| *id)
            .collect();
        for task_id in stale_terminal {
            self.terminal.remove(&task_id);
            stats.dropped += 1;
        }

        stats
    }

    /// Collection sizes (unconfirmed, runnable, in-flight, terminal), for
    /// sweeper logging.
    pub fn depths(&self) -> (usize, usize, usize, usize) {
        (
            self.unconfirmed.len(),
            self.runnable.len(),
            self.in_flight.len(),
            self.terminal.len(),
        )
    }

    /// Which single state a task id is currently in, if any.
    pub fn state_of(
        &self,
        task_id: Uuid,
    ) -> Option<TaskState> {
        if self.unconfirmed.values().any(|q| q.task.task_id == task_id) {
            return Some(TaskState::Unconfirmed);
        }
        if self.runnable.iter().any(|q| q.task.task_id == task_id) {
            return Some(TaskState::Runnable);
        }
        if self.in_flight.contains_key(&task_id) {
            return Some(TaskState::InFlight);
        }
        if let Some(record) = self.terminal.get(&task_id) {
            return Some(record.outcome);
        }
        if self.expired.values().any(|r| r.task_id == task_id) {
            return Some(TaskState::Expired);
        }
        None
    }

    /// Panic if any task id is tracked by more than one collection. Only a
    /// test aid; the public API cannot produce such a state.
    #[cfg(test)]
    fn assert_consistent(&self) {
        let mut seen = std::collections::HashSet::new();
        let all = self
            .unconfirmed
            .values()
            .map(|q| q.task.task_id)
            .chain(self.runnable.iter().map(|q| q.task.task_id))
            .chain(self.in_flight.keys().copied())
            .chain(self.terminal.keys().copied())
            .chain(self.expired.values().map(|r| r.task_id));
        for id in all {
            assert!(seen.insert(id), "task {id} tracked in two states");
        }
    }
}

/// The short token a submitter exchanges for the Unconfirmed -> Runnable
/// transition. Alphanumeric so it can live in a URL path segment unescaped.
fn generate_confirmation_code() -> String {
    let mut rng = thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(8)
        .collect()
}
