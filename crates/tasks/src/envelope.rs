//! Dispatch wire types: envelopes, synchronous dispatch results, and the
//! read models derived from broker/result-store state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use despacho_core::TaskId;

/// Broker-level task state, as surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Active,
    Scheduled,
    Reserved,
    Success,
    Failure,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Active => "ACTIVE",
            TaskStatus::Scheduled => "SCHEDULED",
            TaskStatus::Reserved => "RESERVED",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failure => "FAILURE",
            TaskStatus::Error => "ERROR",
        }
    }

    /// Finished means a result (or failure) is recorded; no further
    /// transitions will happen for this task id.
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }
}

/// The unit of work submitted to the broker.
///
/// Created by the dispatcher at send time; consumed exactly once by the
/// worker that dequeues it. The signature covers `{task_name, args}` — a
/// worker rejects the envelope if it does not recompute under the shared
/// internal key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchEnvelope {
    pub task_id: TaskId,
    pub task_name: String,
    pub args: Vec<Value>,
    /// Named options, including the `info_internal` trace object.
    pub options: Map<String, Value>,
    pub internal_signature: String,
    pub queue: String,
}

impl DispatchEnvelope {
    /// The exact payload the internal signature is computed over.
    pub fn signed_payload(&self) -> Value {
        serde_json::json!({
            "task_name": self.task_name,
            "args": self.args,
        })
    }
}

/// Outcome of a dispatch call, returned synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchStatus {
    /// Accepted by the broker; execution is asynchronous.
    Pending,
    /// Never reached the broker (unknown task, bad arity, broker failure).
    Failed,
}

/// Synchronous answer to `dispatch`. Never mutated afterward — later state
/// is fetched by re-querying the broker by `task_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub task_name: String,
    pub status: DispatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub args: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchResult {
    pub fn pending(task_id: TaskId, task_name: &str, queue: &str, args: Vec<Value>) -> Self {
        Self {
            task_id: Some(task_id),
            task_name: task_name.to_string(),
            status: DispatchStatus::Pending,
            queue: Some(queue.to_string()),
            timestamp: Utc::now(),
            args,
            error: None,
        }
    }

    pub fn failed(task_name: &str, error: impl Into<String>) -> Self {
        Self {
            task_id: None,
            task_name: task_name.to_string(),
            status: DispatchStatus::Failed,
            queue: None,
            timestamp: Utc::now(),
            args: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == DispatchStatus::Pending
    }
}

/// Record persisted in the result store once a worker finishes (or reports
/// progress on) a task. Keyed by task id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMeta {
    pub task_id: TaskId,
    pub task_name: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub args: Vec<Value>,
    pub worker: String,
    pub date_done: DateTime<Utc>,
}

/// Read model over broker state for a single task, derived on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultView {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub ready: bool,
    /// `None` until the task finishes.
    pub successful: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaskResultView {
    /// View for a task with no recorded result yet.
    pub fn pending(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            ready: false,
            successful: None,
            result: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// View for a broker/result-store access failure. Surfaced as data, not
    /// as an error to the caller.
    pub fn broker_error(task_id: TaskId, error: impl Into<String>) -> Self {
        Self {
            task_id,
            status: TaskStatus::Error,
            ready: false,
            successful: None,
            result: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn from_meta(meta: &TaskMeta) -> Self {
        let ready = meta.status.is_finished();
        Self {
            task_id: meta.task_id,
            status: meta.status,
            ready,
            successful: ready.then(|| meta.status == TaskStatus::Success),
            result: meta.result.clone(),
            error: meta.error.clone(),
            timestamp: meta.date_done,
        }
    }
}

/// One row of the bulk task listing. Undecodable result-store entries still
/// produce a row with the minimal fields filled in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub state: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
}

impl TaskSnapshot {
    /// Minimal row for an entry whose metadata could not be decoded.
    pub fn minimal(id: impl Into<String>, state: TaskStatus) -> Self {
        Self {
            id: id.into(),
            name: None,
            state,
            worker: None,
            args: None,
            result: None,
            finished: None,
        }
    }
}

/// Aggregated listing across broker inspection and the result store.
///
/// `skipped` counts entries dropped because a source failed or an entry was
/// beyond minimal decoding — the listing degrades, it never fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskListing {
    pub tasks: Vec<TaskSnapshot>,
    pub skipped: usize,
}
