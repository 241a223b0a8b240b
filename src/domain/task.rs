//! The wire-level task and its lifecycle vocabulary.
//!
//! A task moves through a fixed set of states, owned entirely by the queue:
//!
//! ```text
//! Unconfirmed --confirm------------> Runnable
//! Unconfirmed --confirm timeout----> Expired
//! Runnable    --matching poll------> InFlight
//! InFlight    --heartbeat timeout--> Runnable (reclaim, head of queue)
//! InFlight    --succeed ack--------> Done
//! InFlight    --failed ack---------> Failed
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::EmailAddress;
use crate::domain::ParameterValue;

/// One user-submitted model execution request, as exchanged between the
/// web front-end, the queue, and the workers.
///
/// The submitter sends a nil `taskId`; the queue assigns the real one at
/// submission and returns the stamped task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default = "Uuid::nil")]
    pub task_id: Uuid,
    pub model_name: String,
    pub model_version: String,
    pub email_address: EmailAddress,
    pub model_parameters: BTreeMap<String, ParameterValue>,
}

/// Lifecycle state. `Done` and `Failed` are terminal; `Expired` is the fate
/// of a task whose confirmation window lapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Unconfirmed,
    Runnable,
    InFlight,
    Done,
    Failed,
    Expired,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Expired)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let s = match self {
            Self::Unconfirmed => "unconfirmed",
            Self::Runnable => "runnable",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}
