//! Delivery confirmation workflow.
//!
//! Turns a "confirm delivery" request into a validated, durable state
//! transition: field validation, remote signature validation, then an
//! asynchronous `procesar_entrega` dispatch whose target state depends on
//! whether the downstream dependency looks usable right now.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, json};
use thiserror::Error;
use tracing::{info, warn};

use despacho_core::EntregaId;
use despacho_logistica::{ConfirmacionError, ConfirmacionInfo, EstadoEntrega};
use despacho_tasks::{DispatchResult, names};

use crate::authority::AuthorityClient;
use crate::availability::DownstreamAvailability;
use crate::dispatcher::TaskDispatcher;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Caller error: a required field is absent. Nothing was dispatched.
    #[error(transparent)]
    MissingField(#[from] ConfirmacionError),

    /// The authority could not confirm the signature. Nothing was dispatched.
    #[error("firma no válida")]
    InvalidSignature,
}

/// Answer to an accepted confirmation. Both branches are a `200` to the
/// caller: either the delivery completes now, or the system owns
/// reconciliation from here.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationOutcome {
    pub entrega_id: EntregaId,
    pub estado: &'static str,
    pub message: &'static str,
    pub timestamp: DateTime<Utc>,
    pub dispatch: DispatchResult,
}

/// The workflow with its injected collaborators.
#[derive(Clone)]
pub struct ConfirmationWorkflow {
    dispatcher: Arc<TaskDispatcher>,
    authority: Arc<dyn AuthorityClient>,
    availability: Arc<dyn DownstreamAvailability>,
}

impl ConfirmationWorkflow {
    pub fn new(
        dispatcher: Arc<TaskDispatcher>,
        authority: Arc<dyn AuthorityClient>,
        availability: Arc<dyn DownstreamAvailability>,
    ) -> Self {
        Self {
            dispatcher,
            authority,
            availability,
        }
    }

    /// Run one confirmation. No side effect happens before both the field
    /// validation and the signature validation pass.
    pub async fn confirmar(
        &self,
        entrega_id: EntregaId,
        retry_count: u32,
        info: &ConfirmacionInfo,
    ) -> Result<ConfirmationOutcome, WorkflowError> {
        info.validate()?;

        let valid = self
            .authority
            .validate_signature(
                &info.authority_payload(),
                info.firma_payload.as_deref().unwrap_or_default(),
            )
            .await
            .unwrap_or_else(|e| {
                warn!(%entrega_id, error = %e, "authority unreachable; treating signature as invalid");
                false
            });

        if !valid {
            return Err(WorkflowError::InvalidSignature);
        }

        // "Try to complete now": target state depends on whether the
        // downstream dependency is usable at this instant.
        let (target, estado, message) = if self.availability.check() {
            (
                EstadoEntrega::Entregada,
                "exitoso",
                "Tarea enviada",
            )
        } else {
            warn!(%entrega_id, "downstream unavailable; delivery enters reconciliation");
            (
                EstadoEntrega::PendingSystemConfirmation,
                "Pendiente Confirmacion Sistema",
                "Sistema temporalmente no disponible, reintentando automáticamente",
            )
        };

        let dispatch = self
            .dispatcher
            .dispatch(
                names::PROCESAR_ENTREGA,
                vec![
                    json!(entrega_id),
                    json!(target.as_str()),
                    json!(retry_count),
                    json!(info),
                ],
                Map::new(),
            )
            .await;

        info!(%entrega_id, estado, task_id = ?dispatch.task_id, "confirmation dispatched");

        Ok(ConfirmationOutcome {
            entrega_id,
            estado,
            message,
            timestamp: Utc::now(),
            dispatch,
        })
    }
}
