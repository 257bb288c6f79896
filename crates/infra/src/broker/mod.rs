//! Broker abstraction: an at-least-once durable queue with per-queue routing
//! plus a key/value result store.
//!
//! The dispatcher and the workers only see this trait; production wiring uses
//! [`RedisBroker`], dev/test wiring uses [`InMemoryBroker`].

use std::collections::HashMap;

use async_trait::async_trait;

use despacho_core::TaskId;
use despacho_tasks::{DispatchEnvelope, TaskMeta, TaskSnapshot};

mod in_memory;
mod redis_broker;

pub use in_memory::InMemoryBroker;
pub use redis_broker::RedisBroker;

/// Broker access failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("broker command error: {0}")]
    Command(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Which in-flight population to inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectState {
    /// Currently executing on a worker.
    Active,
    /// Scheduled for a later time (unused by this broker: no ETA support).
    Scheduled,
    /// Sitting in a queue, not yet picked up.
    Reserved,
}

/// One entry from a bounded result-store scan. `meta` is `None` when the
/// stored value could not be decoded; the id alone still identifies the task.
#[derive(Debug, Clone)]
pub struct ResultEntry {
    pub task_id: String,
    pub meta: Option<TaskMeta>,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Append an envelope to its queue. Returns the accepted task id.
    async fn enqueue(&self, envelope: DispatchEnvelope) -> Result<TaskId, BrokerError>;

    /// Pop the next envelope from a queue, if any. Non-blocking; workers poll.
    async fn dequeue(&self, queue: &str) -> Result<Option<DispatchEnvelope>, BrokerError>;

    /// Persist a task's result/progress record, keyed by task id.
    async fn store_result(&self, meta: TaskMeta) -> Result<(), BrokerError>;

    /// Fetch the result record for a task id, if one exists.
    async fn fetch_result(&self, task_id: TaskId) -> Result<Option<TaskMeta>, BrokerError>;

    /// Bounded scan over the result store (most callers pass ~100).
    async fn scan_results(&self, limit: usize) -> Result<Vec<ResultEntry>, BrokerError>;

    /// Worker-tagged snapshots of in-flight work for one population.
    async fn inspect(
        &self,
        state: InspectState,
    ) -> Result<HashMap<String, Vec<TaskSnapshot>>, BrokerError>;

    /// Record that a worker started executing an envelope.
    async fn mark_active(&self, worker: &str, envelope: &DispatchEnvelope)
    -> Result<(), BrokerError>;

    /// Remove the active-execution record once a task finishes.
    async fn clear_active(&self, worker: &str, task_id: TaskId) -> Result<(), BrokerError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), BrokerError>;
}
