//! Worker runtime: consumes dispatch envelopes from broker queues and
//! executes registered task handlers.
//!
//! Each execution re-validates the internal dispatch signature before any
//! handler code runs. A signature mismatch is a trust violation — the task
//! is aborted and recorded as failed, never retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use despacho_crypto::InternalSigningKey;
use despacho_tasks::{DispatchEnvelope, TaskMeta, TaskStatus, catalog};

use crate::broker::Broker;

pub mod handlers;

/// What a handler produced.
#[derive(Debug)]
pub enum TaskOutcome {
    Success(Value),
    Failure(String),
}

/// One task implementation, registered by name.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, envelope: &DispatchEnvelope) -> TaskOutcome;
}

/// Polling consumer over a set of queues.
///
/// Single-threaded within its slot: one envelope executes at a time. Run
/// several workers (or several processes) for parallelism.
pub struct Worker {
    name: String,
    broker: Arc<dyn Broker>,
    signing_key: InternalSigningKey,
    handlers: HashMap<&'static str, Arc<dyn TaskHandler>>,
    queues: Vec<String>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(name: impl Into<String>, broker: Arc<dyn Broker>, signing_key: InternalSigningKey) -> Self {
        // Default to every queue the catalog routes to.
        let mut queues: Vec<String> = catalog::catalog().iter().map(|d| d.queue.to_string()).collect();
        queues.dedup();
        Self {
            name: name.into(),
            broker,
            signing_key,
            handlers: HashMap::new(),
            queues,
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn with_queues(mut self, queues: Vec<String>) -> Self {
        self.queues = queues;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Register the handler for a task name.
    pub fn register(&mut self, task_name: &'static str, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_name, handler);
    }

    /// Poll every queue once; returns whether any envelope was executed.
    pub async fn run_once(&self) -> bool {
        let mut executed = false;
        for queue in &self.queues {
            match self.broker.dequeue(queue).await {
                Ok(Some(envelope)) => {
                    self.execute(envelope).await;
                    executed = true;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(worker = %self.name, queue = %queue, error = %e, "dequeue failed");
                }
            }
        }
        executed
    }

    /// Consume until cancelled (the caller owns shutdown, e.g. via `select!`).
    pub async fn run(self) {
        info!(worker = %self.name, queues = ?self.queues, "worker started");
        loop {
            if !self.run_once().await {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    async fn execute(&self, envelope: DispatchEnvelope) {
        let task_id = envelope.task_id;
        let task_name = envelope.task_name.clone();
        debug!(worker = %self.name, %task_id, task = %task_name, "claimed envelope");

        if !self
            .signing_key
            .verify(&envelope.signed_payload(), &envelope.internal_signature)
        {
            // Forged or tampered envelope: abort before touching anything.
            error!(worker = %self.name, %task_id, task = %task_name, "invalid internal dispatch signature");
            self.record(&envelope, TaskOutcome::Failure("invalid internal dispatch signature".to_string()))
                .await;
            return;
        }

        if let Err(e) = self.broker.mark_active(&self.name, &envelope).await {
            warn!(worker = %self.name, %task_id, error = %e, "mark_active failed");
        }

        let outcome = match self.handlers.get(task_name.as_str()) {
            Some(handler) => {
                let budget = catalog::lookup(&task_name)
                    .map(|d| d.timeout())
                    .unwrap_or(Duration::from_secs(300));
                match tokio::time::timeout(budget, handler.run(&envelope)).await {
                    Ok(outcome) => outcome,
                    Err(_) => TaskOutcome::Failure(format!(
                        "task exceeded its {}s budget",
                        budget.as_secs()
                    )),
                }
            }
            None => TaskOutcome::Failure(format!("no handler registered for '{task_name}'")),
        };

        self.record(&envelope, outcome).await;

        if let Err(e) = self.broker.clear_active(&self.name, task_id).await {
            warn!(worker = %self.name, %task_id, error = %e, "clear_active failed");
        }
    }

    async fn record(&self, envelope: &DispatchEnvelope, outcome: TaskOutcome) {
        let (status, result, error) = match outcome {
            TaskOutcome::Success(value) => {
                debug!(task_id = %envelope.task_id, task = %envelope.task_name, "task succeeded");
                (TaskStatus::Success, Some(value), None)
            }
            TaskOutcome::Failure(message) => {
                warn!(task_id = %envelope.task_id, task = %envelope.task_name, error = %message, "task failed");
                (TaskStatus::Failure, None, Some(message))
            }
        };

        let meta = TaskMeta {
            task_id: envelope.task_id,
            task_name: envelope.task_name.clone(),
            status,
            result,
            error,
            args: envelope.args.clone(),
            worker: self.name.clone(),
            date_done: Utc::now(),
        };

        if let Err(e) = self.broker.store_result(meta).await {
            error!(task_id = %envelope.task_id, error = %e, "failed to persist task result");
        }
    }
}
