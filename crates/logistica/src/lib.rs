//! `despacho-logistica` — delivery domain model.
//!
//! Pure domain: the `Entrega` record/state machine and the confirmation
//! payload a caller submits. Persistence and task execution live in infra.

pub mod confirmacion;
pub mod entrega;

pub use confirmacion::{ConfirmacionError, ConfirmacionInfo};
pub use entrega::{Entrega, EstadoEntrega};
