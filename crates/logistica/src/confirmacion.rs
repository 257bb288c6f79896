//! Confirmation payload submitted by a caller.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use despacho_core::{EntregaId, PedidoId, UsuarioId};

/// Input to one confirmation workflow run.
///
/// Immutable once validated. All-or-nothing: either every required field is
/// present or the workflow rejects the request before any side effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmacionInfo {
    pub direccion: Option<String>,
    pub nombre_recibe: Option<String>,
    /// The recipient's signature artifact (e.g. a handwritten signature blob).
    pub firma_recibe: Option<String>,
    /// The exact signed payload string produced by the authority.
    pub firma_payload: Option<String>,
    pub pedido_id: Option<PedidoId>,
    pub usuario_id: Option<UsuarioId>,
    pub entrega_id: Option<EntregaId>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfirmacionError {
    #[error("{0} es requerido en confirmacion_info")]
    Missing(&'static str),
}

impl ConfirmacionInfo {
    /// Check every required field is present, in the order callers see the
    /// first missing one reported.
    pub fn validate(&self) -> Result<(), ConfirmacionError> {
        if self.usuario_id.is_none() {
            return Err(ConfirmacionError::Missing("usuario_id"));
        }
        if self.direccion.as_deref().is_none_or(str::is_empty) {
            return Err(ConfirmacionError::Missing("direccion"));
        }
        if self.nombre_recibe.as_deref().is_none_or(str::is_empty) {
            return Err(ConfirmacionError::Missing("nombre_recibe"));
        }
        if self.firma_recibe.as_deref().is_none_or(str::is_empty) {
            return Err(ConfirmacionError::Missing("firma_recibe"));
        }
        if self.firma_payload.as_deref().is_none_or(str::is_empty) {
            return Err(ConfirmacionError::Missing("firma_payload"));
        }
        if self.pedido_id.is_none() {
            return Err(ConfirmacionError::Missing("pedido_id"));
        }
        if self.entrega_id.is_none() {
            return Err(ConfirmacionError::Missing("entrega_id"));
        }
        Ok(())
    }

    /// Reconstruct the payload the authority originally signed: the same
    /// field set, canonicalized by the signing layer. `firma_payload` itself
    /// is not part of it.
    pub fn authority_payload(&self) -> Value {
        json!({
            "direccion": self.direccion,
            "nombre_recibe": self.nombre_recibe,
            "firma_recibe": self.firma_recibe,
            "pedido_id": self.pedido_id,
            "usuario_id": self.usuario_id,
            "entrega_id": self.entrega_id,
        })
    }
}
