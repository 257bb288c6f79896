//! `despacho-tasks` — task catalog and dispatch data model.
//!
//! Pure lookup/validation and wire types; no I/O. The catalog defines task
//! metadata only — task *code* lives with the worker that executes it.

pub mod catalog;
pub mod envelope;

pub use catalog::{
    CatalogError, TaskDescriptor, catalog, list_available, lookup, tasks_by_queue, validate_params,
};
pub use envelope::{
    DispatchEnvelope, DispatchResult, DispatchStatus, TaskListing, TaskMeta, TaskResultView,
    TaskSnapshot, TaskStatus,
};

/// Task name constants (dotted namespace: `domain.action`).
pub mod names {
    pub const PROCESAR_ENTREGA: &str = "logistica.procesar_entrega";
    pub const VALIDAR_INVENTARIO: &str = "logistica.validar_inventario";
    pub const GENERAR_REPORTE: &str = "logistica.generar_reporte";
    pub const HEALTH_CHECK: &str = "monitor.health_check";
    pub const LOG_ACTIVITY: &str = "monitor.log_activity";
    pub const GENERATE_METRICS: &str = "monitor.generate_metrics";
    pub const PING_LOGISTICA: &str = "monitor.ping_logistica";
}
