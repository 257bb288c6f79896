//! In-memory broker for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use despacho_core::TaskId;
use despacho_tasks::{DispatchEnvelope, TaskMeta, TaskSnapshot, TaskStatus};

use super::{Broker, BrokerError, InspectState, ResultEntry};

/// In-memory queues + result store behind mutexes.
///
/// Also records every accepted envelope so tests can assert exactly what
/// reached the broker, and can be flipped into an "unavailable" mode to
/// exercise degradation paths.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    queues: Mutex<HashMap<String, VecDeque<DispatchEnvelope>>>,
    results: Mutex<HashMap<TaskId, TaskMeta>>,
    active: Mutex<HashMap<String, Vec<DispatchEnvelope>>>,
    enqueued: Mutex<Vec<DispatchEnvelope>>,
    unavailable: AtomicBool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Simulate a broker outage: every operation fails until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every envelope accepted so far, in order (test assertion hook).
    pub fn enqueued(&self) -> Vec<DispatchEnvelope> {
        self.enqueued.lock().unwrap().clone()
    }

    pub fn enqueued_count(&self) -> usize {
        self.enqueued.lock().unwrap().len()
    }

    fn check_available(&self) -> Result<(), BrokerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BrokerError::Connection("broker unavailable".to_string()));
        }
        Ok(())
    }

    fn snapshot_of(envelope: &DispatchEnvelope, state: TaskStatus, worker: Option<&str>) -> TaskSnapshot {
        TaskSnapshot {
            id: envelope.task_id.to_string(),
            name: Some(envelope.task_name.clone()),
            state,
            worker: worker.map(str::to_string),
            args: Some(envelope.args.clone()),
            result: None,
            finished: None,
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn enqueue(&self, envelope: DispatchEnvelope) -> Result<TaskId, BrokerError> {
        self.check_available()?;
        let task_id = envelope.task_id;
        self.enqueued.lock().unwrap().push(envelope.clone());
        self.queues
            .lock()
            .unwrap()
            .entry(envelope.queue.clone())
            .or_default()
            .push_back(envelope);
        Ok(task_id)
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<DispatchEnvelope>, BrokerError> {
        self.check_available()?;
        Ok(self
            .queues
            .lock()
            .unwrap()
            .get_mut(queue)
            .and_then(VecDeque::pop_front))
    }

    async fn store_result(&self, meta: TaskMeta) -> Result<(), BrokerError> {
        self.check_available()?;
        self.results.lock().unwrap().insert(meta.task_id, meta);
        Ok(())
    }

    async fn fetch_result(&self, task_id: TaskId) -> Result<Option<TaskMeta>, BrokerError> {
        self.check_available()?;
        Ok(self.results.lock().unwrap().get(&task_id).cloned())
    }

    async fn scan_results(&self, limit: usize) -> Result<Vec<ResultEntry>, BrokerError> {
        self.check_available()?;
        let results = self.results.lock().unwrap();
        let mut entries: Vec<_> = results.values().cloned().collect();
        entries.sort_by_key(|m| m.date_done);
        entries.truncate(limit);
        Ok(entries
            .into_iter()
            .map(|meta| ResultEntry {
                task_id: meta.task_id.to_string(),
                meta: Some(meta),
            })
            .collect())
    }

    async fn inspect(
        &self,
        state: InspectState,
    ) -> Result<HashMap<String, Vec<TaskSnapshot>>, BrokerError> {
        self.check_available()?;
        let mut out: HashMap<String, Vec<TaskSnapshot>> = HashMap::new();
        match state {
            InspectState::Active => {
                for (worker, envelopes) in self.active.lock().unwrap().iter() {
                    out.insert(
                        worker.clone(),
                        envelopes
                            .iter()
                            .map(|e| Self::snapshot_of(e, TaskStatus::Active, Some(worker)))
                            .collect(),
                    );
                }
            }
            InspectState::Scheduled => {}
            InspectState::Reserved => {
                for (queue, envelopes) in self.queues.lock().unwrap().iter() {
                    if envelopes.is_empty() {
                        continue;
                    }
                    out.insert(
                        queue.clone(),
                        envelopes
                            .iter()
                            .map(|e| Self::snapshot_of(e, TaskStatus::Reserved, None))
                            .collect(),
                    );
                }
            }
        }
        Ok(out)
    }

    async fn mark_active(
        &self,
        worker: &str,
        envelope: &DispatchEnvelope,
    ) -> Result<(), BrokerError> {
        self.check_available()?;
        self.active
            .lock()
            .unwrap()
            .entry(worker.to_string())
            .or_default()
            .push(envelope.clone());
        Ok(())
    }

    async fn clear_active(&self, worker: &str, task_id: TaskId) -> Result<(), BrokerError> {
        self.check_available()?;
        if let Some(envelopes) = self.active.lock().unwrap().get_mut(worker) {
            envelopes.retain(|e| e.task_id != task_id);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn envelope(queue: &str) -> DispatchEnvelope {
        DispatchEnvelope {
            task_id: TaskId::new(),
            task_name: "monitor.health_check".to_string(),
            args: vec![],
            options: Map::new(),
            internal_signature: "sig".to_string(),
            queue: queue.to_string(),
        }
    }

    #[tokio::test]
    async fn enqueue_dequeue_is_fifo_per_queue() {
        let broker = InMemoryBroker::new();
        let first = envelope("monitor");
        let second = envelope("monitor");
        broker.enqueue(first.clone()).await.unwrap();
        broker.enqueue(second.clone()).await.unwrap();
        broker.enqueue(envelope("logistica")).await.unwrap();

        assert_eq!(
            broker.dequeue("monitor").await.unwrap().unwrap().task_id,
            first.task_id
        );
        assert_eq!(
            broker.dequeue("monitor").await.unwrap().unwrap().task_id,
            second.task_id
        );
        assert!(broker.dequeue("monitor").await.unwrap().is_none());
        assert!(broker.dequeue("logistica").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unavailable_mode_fails_everything() {
        let broker = InMemoryBroker::new();
        broker.set_unavailable(true);
        assert!(broker.enqueue(envelope("monitor")).await.is_err());
        assert!(broker.ping().await.is_err());
        broker.set_unavailable(false);
        assert!(broker.ping().await.is_ok());
    }

    #[tokio::test]
    async fn reserved_inspection_reflects_queued_work() {
        let broker = InMemoryBroker::new();
        broker.enqueue(envelope("logistica")).await.unwrap();

        let reserved = broker.inspect(InspectState::Reserved).await.unwrap();
        assert_eq!(reserved["logistica"].len(), 1);
        assert_eq!(reserved["logistica"][0].state, TaskStatus::Reserved);

        broker.dequeue("logistica").await.unwrap();
        let reserved = broker.inspect(InspectState::Reserved).await.unwrap();
        assert!(reserved.is_empty());
    }

    #[tokio::test]
    async fn active_bookkeeping_round_trips() {
        let broker = InMemoryBroker::new();
        let e = envelope("logistica");
        broker.mark_active("worker-1", &e).await.unwrap();

        let active = broker.inspect(InspectState::Active).await.unwrap();
        assert_eq!(active["worker-1"][0].worker.as_deref(), Some("worker-1"));

        broker.clear_active("worker-1", e.task_id).await.unwrap();
        let active = broker.inspect(InspectState::Active).await.unwrap();
        assert!(active["worker-1"].is_empty());
    }
}
