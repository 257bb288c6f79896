//! Retry/backoff reconciliation loop.
//!
//! Re-submits `procesar_entrega` through the service's *public* task
//! boundary rather than re-enqueuing directly, so authorization and
//! signature checks re-run on every attempt. Implemented as a bounded
//! iterative loop — never recursion.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use despacho_core::{EntregaId, TaskId};
use despacho_logistica::ConfirmacionInfo;

/// Policy for one reconciliation run.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Upper bound of the random jitter base, in seconds.
    pub jitter_cap: f64,
    /// Per-attempt HTTP timeout. Must stay below the `procesar_entrega`
    /// descriptor timeout so a hung endpoint cannot eat the worker slot.
    pub http_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            jitter_cap: 0.1,
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Sleep before attempt `current_retry`: `uniform(0, cap) ^ current`.
    fn backoff(&self, current_retry: u32) -> Duration {
        let base: f64 = rand::thread_rng().gen_range(0.0..self.jitter_cap.max(f64::EPSILON));
        Duration::from_secs_f64(base.powi(current_retry as i32))
    }
}

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("retry endpoint answered {0}")]
    Status(u16),

    #[error("retry call failed: {0}")]
    Transport(String),
}

/// Accepted re-submission, as answered by the public boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryAccepted {
    pub task_id: Option<TaskId>,
}

/// Transport seam for the re-entry call (mockable in tests).
#[async_trait]
pub trait RetrySubmitter: Send + Sync {
    async fn submit(
        &self,
        entrega_id: EntregaId,
        retry_count: u32,
        info: &ConfirmacionInfo,
    ) -> Result<RetryAccepted, RetryError>;
}

/// Terminal outcome of one reconciliation run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status")]
pub enum RetryOutcome {
    #[serde(rename = "RETRY_SUBMITTED")]
    Submitted {
        task_id: Option<TaskId>,
        retry_count: u32,
    },
    #[serde(rename = "FAILED_MAX_RETRIES")]
    FailedMaxRetries { retry_count: u32 },
}

/// The loop itself. Owns no delivery state: exhaustion is reported to the
/// caller, which decides whether to persist a terminal delivery state.
#[derive(Clone)]
pub struct RetryLoop {
    submitter: Arc<dyn RetrySubmitter>,
    policy: RetryPolicy,
}

impl RetryLoop {
    pub fn new(submitter: Arc<dyn RetrySubmitter>, policy: RetryPolicy) -> Self {
        Self { submitter, policy }
    }

    pub async fn run(
        &self,
        entrega_id: EntregaId,
        current_retry: u32,
        info: &ConfirmacionInfo,
    ) -> RetryOutcome {
        let mut current = current_retry;

        loop {
            if current >= self.policy.max_retries {
                warn!(%entrega_id, retry_count = current, "max retries reached");
                return RetryOutcome::FailedMaxRetries {
                    retry_count: current,
                };
            }

            tokio::time::sleep(self.policy.backoff(current)).await;

            info!(
                %entrega_id,
                attempt = current + 1,
                max = self.policy.max_retries,
                "re-submitting delivery through the public boundary"
            );

            match self.submitter.submit(entrega_id, current + 1, info).await {
                Ok(accepted) => {
                    return RetryOutcome::Submitted {
                        task_id: accepted.task_id,
                        retry_count: current + 1,
                    };
                }
                Err(e) => {
                    warn!(%entrega_id, error = %e, "retry submission failed");
                    current += 1;
                }
            }
        }
    }
}

/// HTTP submitter against `POST {endpoint}` (the logistics service's own
/// `/tareas` boundary), carrying the service API credential.
#[derive(Debug, Clone)]
pub struct HttpRetrySubmitter {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpRetrySubmitter {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, policy: &RetryPolicy) -> Self {
        let http = reqwest::Client::builder()
            .timeout(policy.http_timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl RetrySubmitter for HttpRetrySubmitter {
    async fn submit(
        &self,
        entrega_id: EntregaId,
        retry_count: u32,
        info: &ConfirmacionInfo,
    ) -> Result<RetryAccepted, RetryError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("i-api-key", &self.api_key)
            .json(&json!({
                "tipo": "procesar_entrega",
                "entrega_id": entrega_id,
                "_retry_count": retry_count,
                "confirmacion_info": info,
            }))
            .send()
            .await
            .map_err(|e| RetryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetryError::Status(status.as_u16()));
        }

        response
            .json::<RetryAccepted>()
            .await
            .map_err(|e| RetryError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysFails {
        calls: AtomicU32,
    }

    #[async_trait]
    impl RetrySubmitter for AlwaysFails {
        async fn submit(
            &self,
            _entrega_id: EntregaId,
            _retry_count: u32,
            _info: &ConfirmacionInfo,
        ) -> Result<RetryAccepted, RetryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RetryError::Status(503))
        }
    }

    /// Fails the first `failures` calls, then succeeds.
    struct SucceedsAfter {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RetrySubmitter for SucceedsAfter {
        async fn submit(
            &self,
            _entrega_id: EntregaId,
            _retry_count: u32,
            _info: &ConfirmacionInfo,
        ) -> Result<RetryAccepted, RetryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(RetryError::Transport("connection refused".to_string()))
            } else {
                Ok(RetryAccepted {
                    task_id: Some(TaskId::new()),
                })
            }
        }
    }

    fn info() -> ConfirmacionInfo {
        ConfirmacionInfo {
            direccion: Some("Calle 1".to_string()),
            nombre_recibe: Some("Ana".to_string()),
            firma_recibe: Some("firma".to_string()),
            firma_payload: Some("payload".to_string()),
            pedido_id: Some(9.into()),
            usuario_id: Some(3.into()),
            entrega_id: Some(1.into()),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            jitter_cap: 0.001,
            http_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn exhaustion_after_exactly_max_attempts() {
        let submitter = Arc::new(AlwaysFails {
            calls: AtomicU32::new(0),
        });
        let retry = RetryLoop::new(submitter.clone(), fast_policy());

        let outcome = retry.run(EntregaId::new(1), 0, &info()).await;

        assert_eq!(outcome, RetryOutcome::FailedMaxRetries { retry_count: 3 });
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn starting_at_the_cap_makes_no_calls() {
        let submitter = Arc::new(AlwaysFails {
            calls: AtomicU32::new(0),
        });
        let retry = RetryLoop::new(submitter.clone(), fast_policy());

        let outcome = retry.run(EntregaId::new(1), 3, &info()).await;

        assert_eq!(outcome, RetryOutcome::FailedMaxRetries { retry_count: 3 });
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_reports_the_submitted_attempt() {
        let submitter = Arc::new(SucceedsAfter {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        let retry = RetryLoop::new(submitter.clone(), fast_policy());

        let outcome = retry.run(EntregaId::new(1), 0, &info()).await;

        match outcome {
            RetryOutcome::Submitted { retry_count, .. } => assert_eq!(retry_count, 2),
            other => panic!("expected submission, got {other:?}"),
        }
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn outcome_serializes_with_status_tags() {
        let v = serde_json::to_value(RetryOutcome::FailedMaxRetries { retry_count: 3 }).unwrap();
        assert_eq!(v["status"], "FAILED_MAX_RETRIES");

        let v = serde_json::to_value(RetryOutcome::Submitted {
            task_id: None,
            retry_count: 1,
        })
        .unwrap();
        assert_eq!(v["status"], "RETRY_SUBMITTED");
    }
}
