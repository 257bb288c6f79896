//! Task dispatcher: the single entry point producers use to enqueue work.
//!
//! Every failure on this boundary is converted into a structured result —
//! dispatch never raises past this type.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use despacho_core::TaskId;
use despacho_crypto::InternalSigningKey;
use despacho_tasks::{
    DispatchEnvelope, DispatchResult, TaskListing, TaskResultView, TaskSnapshot, TaskStatus,
    catalog,
};

use crate::broker::{Broker, InspectState};

/// Bound on the result-store scan used by the bulk listing.
const LIST_SCAN_LIMIT: usize = 100;

/// Stateless dispatcher over an injected broker handle.
///
/// Safe for concurrent use by any number of producers; holds no mutable
/// state beyond the broker client.
#[derive(Clone)]
pub struct TaskDispatcher {
    broker: Arc<dyn Broker>,
    signing_key: InternalSigningKey,
}

impl TaskDispatcher {
    pub fn new(broker: Arc<dyn Broker>, signing_key: InternalSigningKey) -> Self {
        Self { broker, signing_key }
    }

    /// Enqueue a task by name.
    ///
    /// Looks up the descriptor, validates arity, signs `{task_name, args}`
    /// with the internal key, merges the signature plus an `info_internal`
    /// trace into the options, and submits to the descriptor's queue.
    pub async fn dispatch(
        &self,
        task_name: &str,
        args: Vec<Value>,
        mut options: Map<String, Value>,
    ) -> DispatchResult {
        let descriptor = match catalog::lookup(task_name) {
            Some(d) => d,
            None => {
                return DispatchResult::failed(
                    task_name,
                    format!("task '{task_name}' not found in the catalog"),
                );
            }
        };

        if let Err(e) = catalog::validate_params(task_name, &args) {
            return DispatchResult::failed(task_name, format!("invalid parameters: {e}"));
        }

        let signed_payload = json!({"task_name": task_name, "args": args});
        let signature = self.signing_key.sign(&signed_payload);
        options.insert(
            "info_internal".to_string(),
            json!({"task_name": task_name, "args": args}),
        );

        let envelope = DispatchEnvelope {
            task_id: TaskId::new(),
            task_name: task_name.to_string(),
            args: args.clone(),
            options,
            internal_signature: signature.into_string(),
            queue: descriptor.queue.to_string(),
        };

        match self.broker.enqueue(envelope).await {
            Ok(task_id) => {
                debug!(%task_id, task_name, queue = descriptor.queue, "task dispatched");
                DispatchResult::pending(task_id, task_name, descriptor.queue, args)
            }
            Err(e) => {
                warn!(task_name, error = %e, "broker rejected dispatch");
                let mut result = DispatchResult::failed(task_name, e.to_string());
                result.args = args;
                result
            }
        }
    }

    /// Full result view for one task. Broker failures surface as a view with
    /// status `ERROR`, never as an error.
    pub async fn get_result(&self, task_id: TaskId) -> TaskResultView {
        match self.broker.fetch_result(task_id).await {
            Ok(Some(meta)) => TaskResultView::from_meta(&meta),
            Ok(None) => TaskResultView::pending(task_id),
            Err(e) => TaskResultView::broker_error(task_id, e.to_string()),
        }
    }

    /// Cheap status-only read for polling. Returns the literal `ERROR` when
    /// the broker is unreachable.
    pub async fn get_status(&self, task_id: TaskId) -> &'static str {
        match self.broker.fetch_result(task_id).await {
            Ok(Some(meta)) => meta.status.as_str(),
            Ok(None) => TaskStatus::Pending.as_str(),
            Err(_) => TaskStatus::Error.as_str(),
        }
    }

    /// All registered task names.
    pub fn list_available_tasks(&self) -> Vec<&'static str> {
        catalog::list_available()
    }

    /// Aggregate in-flight and recently completed tasks.
    ///
    /// Best-effort: every source failure is caught and logged, degrading the
    /// listing instead of failing the call. `skipped` counts entries whose
    /// metadata could not be fully decoded.
    pub async fn list_tasks(&self) -> TaskListing {
        let mut listing = TaskListing::default();

        for state in [
            InspectState::Active,
            InspectState::Scheduled,
            InspectState::Reserved,
        ] {
            match self.broker.inspect(state).await {
                Ok(by_worker) => {
                    for (_worker, snapshots) in by_worker {
                        listing.tasks.extend(snapshots);
                    }
                }
                Err(e) => {
                    warn!(?state, error = %e, "broker inspection failed; degrading listing");
                }
            }
        }

        match self.broker.scan_results(LIST_SCAN_LIMIT).await {
            Ok(entries) => {
                for entry in entries {
                    match entry.meta {
                        Some(meta) => listing.tasks.push(TaskSnapshot {
                            id: meta.task_id.to_string(),
                            name: Some(meta.task_name.clone()),
                            state: meta.status,
                            worker: Some(meta.worker.clone()),
                            args: Some(meta.args.clone()),
                            result: meta.result.clone(),
                            finished: Some(meta.date_done),
                        }),
                        None => {
                            // Identity survives even when the value doesn't.
                            listing
                                .tasks
                                .push(TaskSnapshot::minimal(entry.task_id, TaskStatus::Pending));
                            listing.skipped += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "result-store scan failed; degrading listing");
            }
        }

        listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use chrono::Utc;
    use despacho_tasks::{DispatchStatus, TaskMeta, names};
    use serde_json::json;

    fn dispatcher(broker: Arc<InMemoryBroker>) -> TaskDispatcher {
        TaskDispatcher::new(broker, InternalSigningKey::new("internal-key"))
    }

    #[tokio::test]
    async fn unknown_task_never_reaches_the_broker() {
        let broker = InMemoryBroker::arc();
        let d = dispatcher(broker.clone());

        let result = d.dispatch("logistica.no_existe", vec![], Map::new()).await;

        assert_eq!(result.status, DispatchStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("logistica.no_existe"));
        assert_eq!(broker.enqueued_count(), 0);
    }

    #[tokio::test]
    async fn arity_mismatch_never_reaches_the_broker() {
        let broker = InMemoryBroker::arc();
        let d = dispatcher(broker.clone());

        let result = d
            .dispatch(names::VALIDAR_INVENTARIO, vec![json!(456)], Map::new())
            .await;

        assert_eq!(result.status, DispatchStatus::Failed);
        assert_eq!(broker.enqueued_count(), 0);
    }

    #[tokio::test]
    async fn dispatch_signs_and_routes_the_envelope() {
        let broker = InMemoryBroker::arc();
        let d = dispatcher(broker.clone());

        let result = d
            .dispatch(names::VALIDAR_INVENTARIO, vec![json!(456), json!(10)], Map::new())
            .await;

        assert_eq!(result.status, DispatchStatus::Pending);
        assert_eq!(result.queue.as_deref(), Some("logistica"));

        let enqueued = broker.enqueued();
        assert_eq!(enqueued.len(), 1);
        let envelope = &enqueued[0];
        assert_eq!(envelope.queue, "logistica");
        assert!(envelope.options.contains_key("info_internal"));

        let key = InternalSigningKey::new("internal-key");
        assert!(key.verify(&envelope.signed_payload(), &envelope.internal_signature));
    }

    #[tokio::test]
    async fn broker_failure_becomes_a_failed_result() {
        let broker = InMemoryBroker::arc();
        broker.set_unavailable(true);
        let d = dispatcher(broker.clone());

        let result = d.dispatch(names::HEALTH_CHECK, vec![], Map::new()).await;
        assert_eq!(result.status, DispatchStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn get_status_degrades_to_error_literal() {
        let broker = InMemoryBroker::arc();
        let d = dispatcher(broker.clone());
        let id = TaskId::new();

        assert_eq!(d.get_status(id).await, "PENDING");

        broker.set_unavailable(true);
        assert_eq!(d.get_status(id).await, "ERROR");
    }

    #[tokio::test]
    async fn get_result_surfaces_stored_meta() {
        let broker = InMemoryBroker::arc();
        let d = dispatcher(broker.clone());
        let id = TaskId::new();

        broker
            .store_result(TaskMeta {
                task_id: id,
                task_name: names::HEALTH_CHECK.to_string(),
                status: TaskStatus::Success,
                result: Some(json!({"system_status": "healthy"})),
                error: None,
                args: vec![],
                worker: "worker-1".to_string(),
                date_done: Utc::now(),
            })
            .await
            .unwrap();

        let view = d.get_result(id).await;
        assert!(view.ready);
        assert_eq!(view.successful, Some(true));
    }

    #[tokio::test]
    async fn listing_degrades_on_broker_outage() {
        let broker = InMemoryBroker::arc();
        let d = dispatcher(broker.clone());

        d.dispatch(names::HEALTH_CHECK, vec![], Map::new()).await;

        let listing = d.list_tasks().await;
        assert_eq!(listing.tasks.len(), 1); // reserved in queue

        broker.set_unavailable(true);
        let listing = d.list_tasks().await;
        assert!(listing.tasks.is_empty());
    }

    #[tokio::test]
    async fn listing_merges_completed_results() {
        let broker = InMemoryBroker::arc();
        let d = dispatcher(broker.clone());

        broker
            .store_result(TaskMeta {
                task_id: TaskId::new(),
                task_name: names::GENERAR_REPORTE.to_string(),
                status: TaskStatus::Success,
                result: Some(json!({"entregas_procesadas": 42})),
                error: None,
                args: vec![json!(null), json!(null)],
                worker: "worker-1".to_string(),
                date_done: Utc::now(),
            })
            .await
            .unwrap();

        let listing = d.list_tasks().await;
        assert_eq!(listing.tasks.len(), 1);
        assert_eq!(listing.skipped, 0);
        assert_eq!(listing.tasks[0].state, TaskStatus::Success);
    }
}
