//! Redis-backed broker (durable queues + result store).
//!
//! - **Queues**: one list per queue name (`despacho:queue:{name}`), LPUSH on
//!   enqueue, RPOP on dequeue (FIFO).
//! - **Result store**: `despacho:task-meta:{task_id}` JSON values with a TTL,
//!   scanned with a bounded SCAN for bulk listings.
//! - **Active set**: a hash keyed by task id recording which worker is
//!   executing what, maintained by the worker runtime.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use despacho_core::TaskId;
use despacho_tasks::{DispatchEnvelope, TaskMeta, TaskSnapshot, TaskStatus};

use super::{Broker, BrokerError, InspectState, ResultEntry};

/// Result records expire after an hour, matching the worker's bounded
/// interest in completed tasks.
const RESULT_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct RedisBroker {
    client: Arc<redis::Client>,
    namespace: String,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ActiveRecord {
    worker: String,
    envelope: DispatchEnvelope,
}

impl RedisBroker {
    /// Connect lazily to the given Redis URL (e.g. `redis://redis:6379/0`).
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
            namespace: "despacho".to_string(),
        })
    }

    /// Override the key namespace (test isolation).
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    async fn conn(&self) -> Result<MultiplexedConnection, BrokerError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))
    }

    fn queue_key(&self, queue: &str) -> String {
        format!("{}:queue:{}", self.namespace, queue)
    }

    fn queues_key(&self) -> String {
        format!("{}:queues", self.namespace)
    }

    fn meta_key(&self, task_id: &str) -> String {
        format!("{}:task-meta:{}", self.namespace, task_id)
    }

    fn active_key(&self) -> String {
        format!("{}:active", self.namespace)
    }

    fn strip_meta_prefix<'a>(&self, key: &'a str) -> &'a str {
        key.rsplit(':').next().unwrap_or(key)
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn enqueue(&self, envelope: DispatchEnvelope) -> Result<TaskId, BrokerError> {
        let payload = serde_json::to_string(&envelope)
            .map_err(|e| BrokerError::Serialization(e.to_string()))?;
        let mut conn = self.conn().await?;

        let _: i64 = redis::cmd("SADD")
            .arg(self.queues_key())
            .arg(&envelope.queue)
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Command(format!("SADD failed: {e}")))?;

        let _: i64 = redis::cmd("LPUSH")
            .arg(self.queue_key(&envelope.queue))
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Command(format!("LPUSH failed: {e}")))?;

        Ok(envelope.task_id)
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<DispatchEnvelope>, BrokerError> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = redis::cmd("RPOP")
            .arg(self.queue_key(queue))
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Command(format!("RPOP failed: {e}")))?;

        match payload {
            Some(p) => serde_json::from_str(&p)
                .map(Some)
                .map_err(|e| BrokerError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn store_result(&self, meta: TaskMeta) -> Result<(), BrokerError> {
        let payload =
            serde_json::to_string(&meta).map_err(|e| BrokerError::Serialization(e.to_string()))?;
        let mut conn = self.conn().await?;

        let _: String = redis::cmd("SET")
            .arg(self.meta_key(&meta.task_id.to_string()))
            .arg(&payload)
            .arg("EX")
            .arg(RESULT_TTL_SECS)
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Command(format!("SET failed: {e}")))?;

        Ok(())
    }

    async fn fetch_result(&self, task_id: TaskId) -> Result<Option<TaskMeta>, BrokerError> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = redis::cmd("GET")
            .arg(self.meta_key(&task_id.to_string()))
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Command(format!("GET failed: {e}")))?;

        match payload {
            Some(p) => serde_json::from_str(&p)
                .map(Some)
                .map_err(|e| BrokerError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn scan_results(&self, limit: usize) -> Result<Vec<ResultEntry>, BrokerError> {
        let mut conn = self.conn().await?;
        let pattern = format!("{}:task-meta:*", self.namespace);

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| BrokerError::Command(format!("SCAN failed: {e}")))?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 || keys.len() >= limit {
                break;
            }
        }
        keys.truncate(limit);

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let task_id = self.strip_meta_prefix(&key).to_string();
            let payload: Option<String> = redis::cmd("GET")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(|e| BrokerError::Command(format!("GET failed: {e}")))?;

            // Expired-between-scan-and-get or undecodable values still yield
            // an entry; the caller decides how to degrade.
            let meta = payload.and_then(|p| serde_json::from_str(&p).ok());
            entries.push(ResultEntry { task_id, meta });
        }

        Ok(entries)
    }

    async fn inspect(
        &self,
        state: InspectState,
    ) -> Result<HashMap<String, Vec<TaskSnapshot>>, BrokerError> {
        let mut conn = self.conn().await?;
        let mut out: HashMap<String, Vec<TaskSnapshot>> = HashMap::new();

        match state {
            InspectState::Active => {
                let records: HashMap<String, String> = redis::cmd("HGETALL")
                    .arg(self.active_key())
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| BrokerError::Command(format!("HGETALL failed: {e}")))?;

                for (task_id, payload) in records {
                    match serde_json::from_str::<ActiveRecord>(&payload) {
                        Ok(record) => {
                            let snapshot = TaskSnapshot {
                                id: record.envelope.task_id.to_string(),
                                name: Some(record.envelope.task_name.clone()),
                                state: TaskStatus::Active,
                                worker: Some(record.worker.clone()),
                                args: Some(record.envelope.args.clone()),
                                result: None,
                                finished: None,
                            };
                            out.entry(record.worker).or_default().push(snapshot);
                        }
                        Err(_) => {
                            out.entry("unknown".to_string())
                                .or_default()
                                .push(TaskSnapshot::minimal(task_id, TaskStatus::Active));
                        }
                    }
                }
            }
            // No ETA/countdown support in this broker.
            InspectState::Scheduled => {}
            InspectState::Reserved => {
                let queues: Vec<String> = redis::cmd("SMEMBERS")
                    .arg(self.queues_key())
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| BrokerError::Command(format!("SMEMBERS failed: {e}")))?;

                for queue in queues {
                    let payloads: Vec<String> = redis::cmd("LRANGE")
                        .arg(self.queue_key(&queue))
                        .arg(0)
                        .arg(-1)
                        .query_async(&mut conn)
                        .await
                        .map_err(|e| BrokerError::Command(format!("LRANGE failed: {e}")))?;

                    let snapshots: Vec<TaskSnapshot> = payloads
                        .iter()
                        .filter_map(|p| serde_json::from_str::<DispatchEnvelope>(p).ok())
                        .map(|e| TaskSnapshot {
                            id: e.task_id.to_string(),
                            name: Some(e.task_name),
                            state: TaskStatus::Reserved,
                            worker: None,
                            args: Some(e.args),
                            result: None,
                            finished: None,
                        })
                        .collect();

                    if !snapshots.is_empty() {
                        out.insert(queue, snapshots);
                    }
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
        let record = ActiveRecord {
            worker: worker.to_string(),
            envelope: envelope.clone(),
        };
        let payload = serde_json::to_string(&record)
            .map_err(|e| BrokerError::Serialization(e.to_string()))?;
        let mut conn = self.conn().await?;

        let _: i64 = redis::cmd("HSET")
            .arg(self.active_key())
            .arg(envelope.task_id.to_string())
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Command(format!("HSET failed: {e}")))?;

        Ok(())
    }

    async fn clear_active(&self, _worker: &str, task_id: TaskId) -> Result<(), BrokerError> {
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("HDEL")
            .arg(self.active_key())
            .arg(task_id.to_string())
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Command(format!("HDEL failed: {e}")))?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .arg("despacho")
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Command(format!("PING failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_is_namespaced() {
        let broker = RedisBroker::new("redis://localhost:6379").unwrap();
        assert_eq!(broker.queue_key("logistica"), "despacho:queue:logistica");
        assert_eq!(broker.meta_key("abc"), "despacho:task-meta:abc");
        assert_eq!(broker.active_key(), "despacho:active");

        let scoped = RedisBroker::new("redis://localhost:6379")
            .unwrap()
            .with_namespace("test-1");
        assert_eq!(scoped.queues_key(), "test-1:queues");
    }

    #[test]
    fn meta_prefix_stripping() {
        let broker = RedisBroker::new("redis://localhost:6379").unwrap();
        let id = "0190f6f0-0000-7000-8000-000000000000";
        assert_eq!(broker.strip_meta_prefix(&broker.meta_key(id)), id);
    }
}
