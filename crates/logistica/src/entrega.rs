//! The delivery record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use despacho_core::{EntregaId, PedidoId};

/// Delivery lifecycle state.
///
/// Created in `Registrada`; transitioned only by the worker executing
/// `logistica.procesar_entrega`. `PendingSystemConfirmation` is transient and
/// must always eventually resolve via the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstadoEntrega {
    #[serde(rename = "registered")]
    Registrada,
    #[serde(rename = "PENDING_SYSTEM_CONFIRMATION")]
    PendingSystemConfirmation,
    #[serde(rename = "ENTREGADA")]
    Entregada,
    #[serde(rename = "FAILED_MAX_RETRIES")]
    FailedMaxRetries,
}

impl EstadoEntrega {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstadoEntrega::Registrada => "registered",
            EstadoEntrega::PendingSystemConfirmation => "PENDING_SYSTEM_CONFIRMATION",
            EstadoEntrega::Entregada => "ENTREGADA",
            EstadoEntrega::FailedMaxRetries => "FAILED_MAX_RETRIES",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EstadoEntrega::Entregada | EstadoEntrega::FailedMaxRetries
        )
    }
}

impl core::fmt::Display for EstadoEntrega {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for EstadoEntrega {
    type Err = despacho_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(EstadoEntrega::Registrada),
            "PENDING_SYSTEM_CONFIRMATION" => Ok(EstadoEntrega::PendingSystemConfirmation),
            "ENTREGADA" => Ok(EstadoEntrega::Entregada),
            "FAILED_MAX_RETRIES" => Ok(EstadoEntrega::FailedMaxRetries),
            other => Err(despacho_core::DomainError::validation(format!(
                "unknown estado: {other}"
            ))),
        }
    }
}

/// A delivery record as held by the logistics store.
///
/// `direccion`, `nombre_recibe` and `firma_recibe` are stored in their
/// encrypted form; `integridad_firma` keeps the raw signed payload string for
/// later audit/validation and is deliberately not encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entrega {
    pub id: EntregaId,
    pub pedido_id: PedidoId,
    pub estado: EstadoEntrega,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direccion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nombre_recibe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firma_recibe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integridad_firma: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_entrega: Option<DateTime<Utc>>,
}

impl Entrega {
    /// Create a freshly registered delivery (resource-layer entry point).
    pub fn registrar(id: EntregaId, pedido_id: PedidoId, direccion: Option<String>) -> Self {
        Self {
            id,
            pedido_id,
            estado: EstadoEntrega::Registrada,
            direccion,
            nombre_recibe: None,
            firma_recibe: None,
            integridad_firma: None,
            fecha_entrega: None,
        }
    }

    /// Record that system confirmation is pending; reconciliation owns the
    /// rest of the lifecycle from here.
    pub fn marcar_pendiente_confirmacion(&mut self) {
        self.estado = EstadoEntrega::PendingSystemConfirmation;
    }

    /// Complete the delivery. Field values arrive already encrypted;
    /// `integridad_firma` is the raw signed payload string.
    pub fn marcar_entregada(
        &mut self,
        direccion: Option<String>,
        nombre_recibe: Option<String>,
        firma_recibe: Option<String>,
        integridad_firma: Option<String>,
        fecha_entrega: DateTime<Utc>,
    ) {
        self.estado = EstadoEntrega::Entregada;
        if direccion.is_some() {
            self.direccion = direccion;
        }
        if nombre_recibe.is_some() {
            self.nombre_recibe = nombre_recibe;
        }
        if firma_recibe.is_some() {
            self.firma_recibe = firma_recibe;
        }
        self.integridad_firma = integridad_firma;
        self.fecha_entrega = Some(fecha_entrega);
    }

    /// Give up after exhausting reconciliation retries.
    pub fn marcar_fallo_definitivo(&mut self) {
        self.estado = EstadoEntrega::FailedMaxRetries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entrega() -> Entrega {
        Entrega::registrar(
            EntregaId::new(1),
            PedidoId::new(9),
            Some("Calle 1".to_string()),
        )
    }

    #[test]
    fn new_deliveries_start_registered() {
        let e = entrega();
        assert_eq!(e.estado, EstadoEntrega::Registrada);
        assert!(!e.estado.is_terminal());
        assert!(e.fecha_entrega.is_none());
    }

    #[test]
    fn entregada_keeps_existing_fields_when_update_is_absent() {
        let mut e = entrega();
        e.marcar_entregada(None, None, None, Some("payload:sig".to_string()), Utc::now());

        assert_eq!(e.estado, EstadoEntrega::Entregada);
        assert_eq!(e.direccion.as_deref(), Some("Calle 1"));
        assert_eq!(e.integridad_firma.as_deref(), Some("payload:sig"));
        assert!(e.fecha_entrega.is_some());
    }

    #[test]
    fn terminal_states_are_terminal() {
        assert!(EstadoEntrega::Entregada.is_terminal());
        assert!(EstadoEntrega::FailedMaxRetries.is_terminal());
        assert!(!EstadoEntrega::PendingSystemConfirmation.is_terminal());
    }

    #[test]
    fn estado_wire_names_match_the_store() {
        assert_eq!(
            serde_json::to_string(&EstadoEntrega::Entregada).unwrap(),
            "\"ENTREGADA\""
        );
        assert_eq!(
            serde_json::to_string(&EstadoEntrega::Registrada).unwrap(),
            "\"registered\""
        );
        let parsed: EstadoEntrega =
            serde_json::from_str("\"PENDING_SYSTEM_CONFIRMATION\"").unwrap();
        assert_eq!(parsed, EstadoEntrega::PendingSystemConfirmation);
    }
}
