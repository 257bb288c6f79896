//! Static task catalog.
//!
//! An immutable mapping from task name to its metadata: expected parameter
//! names, target queue, and timeout. Loaded once, never mutated — safe to
//! read from any thread without synchronization.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::names;

/// Metadata for a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// Ordered positional parameter names. Validation is structural (count),
    /// not per-field type checking — callers own value semantics.
    pub expected_params: &'static [&'static str],
    pub queue: &'static str,
    pub timeout_secs: u64,
}

impl TaskDescriptor {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Parameter/lookup validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("task '{0}' not found in the catalog")]
    UnknownTask(String),

    #[error("task '{task}' expects {expected} parameters, got {got}")]
    ArityMismatch {
        task: &'static str,
        expected: usize,
        got: usize,
    },
}

const CATALOG: &[TaskDescriptor] = &[
    TaskDescriptor {
        name: names::PROCESAR_ENTREGA,
        description: "Procesa una entrega específica",
        expected_params: &["entrega_id", "status", "_retry_count", "confirmacion_info"],
        queue: "logistica",
        timeout_secs: 300,
    },
    TaskDescriptor {
        name: names::VALIDAR_INVENTARIO,
        description: "Valida disponibilidad en inventario",
        expected_params: &["producto_id", "cantidad"],
        queue: "logistica",
        timeout_secs: 60,
    },
    TaskDescriptor {
        name: names::GENERAR_REPORTE,
        description: "Genera reporte de entregas",
        expected_params: &["fecha_inicio", "fecha_fin"],
        queue: "logistica",
        timeout_secs: 600,
    },
    TaskDescriptor {
        name: names::HEALTH_CHECK,
        description: "Verifica salud de servicios",
        expected_params: &[],
        queue: "monitor",
        timeout_secs: 30,
    },
    TaskDescriptor {
        name: names::LOG_ACTIVITY,
        description: "Registra actividad del sistema",
        expected_params: &["activity_data"],
        queue: "monitor",
        timeout_secs: 60,
    },
    TaskDescriptor {
        name: names::GENERATE_METRICS,
        description: "Genera métricas del sistema",
        expected_params: &[],
        queue: "monitor",
        timeout_secs: 120,
    },
    TaskDescriptor {
        name: names::PING_LOGISTICA,
        description: "Ping al servicio de logística e inventarios",
        expected_params: &[],
        queue: "monitor",
        timeout_secs: 5,
    },
];

/// The full catalog.
pub fn catalog() -> &'static [TaskDescriptor] {
    CATALOG
}

/// Look up a task's metadata by name.
pub fn lookup(name: &str) -> Option<&'static TaskDescriptor> {
    CATALOG.iter().find(|d| d.name == name)
}

/// All registered task names.
pub fn list_available() -> Vec<&'static str> {
    CATALOG.iter().map(|d| d.name).collect()
}

/// Task names routed to a given queue.
pub fn tasks_by_queue(queue: &str) -> Vec<&'static str> {
    CATALOG
        .iter()
        .filter(|d| d.queue == queue)
        .map(|d| d.name)
        .collect()
}

/// Validate positional arguments against a task's expected parameter count.
pub fn validate_params(name: &str, args: &[Value]) -> Result<(), CatalogError> {
    let descriptor = lookup(name).ok_or_else(|| CatalogError::UnknownTask(name.to_string()))?;
    if args.len() != descriptor.expected_params.len() {
        return Err(CatalogError::ArityMismatch {
            task: descriptor.name,
            expected: descriptor.expected_params.len(),
            got: args.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_finds_registered_tasks() {
        let d = lookup(names::PROCESAR_ENTREGA).unwrap();
        assert_eq!(d.queue, "logistica");
        assert_eq!(d.expected_params.len(), 4);
        assert_eq!(d.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn lookup_misses_unknown_names() {
        assert!(lookup("logistica.no_such_task").is_none());
    }

    #[test]
    fn validate_params_accepts_exact_arity() {
        assert!(validate_params(names::VALIDAR_INVENTARIO, &[json!(456), json!(10)]).is_ok());
    }

    #[test]
    fn validate_params_rejects_wrong_arity() {
        assert_eq!(
            validate_params(names::VALIDAR_INVENTARIO, &[json!(456)]),
            Err(CatalogError::ArityMismatch {
                task: names::VALIDAR_INVENTARIO,
                expected: 2,
                got: 1,
            })
        );
        assert!(matches!(
            validate_params(names::VALIDAR_INVENTARIO, &[json!(1), json!(2), json!(3)]),
            Err(CatalogError::ArityMismatch { got: 3, .. })
        ));
    }

    #[test]
    fn validate_params_rejects_unknown_task() {
        assert_eq!(
            validate_params("nope.nope", &[]),
            Err(CatalogError::UnknownTask("nope.nope".to_string()))
        );
    }

    #[test]
    fn zero_arg_tasks_validate_empty() {
        assert!(validate_params(names::HEALTH_CHECK, &[]).is_ok());
        assert!(validate_params(names::HEALTH_CHECK, &[json!(1)]).is_err());
    }

    #[test]
    fn queue_routing_matches_namespaces() {
        assert_eq!(
            tasks_by_queue("logistica"),
            vec![
                names::PROCESAR_ENTREGA,
                names::VALIDAR_INVENTARIO,
                names::GENERAR_REPORTE,
            ]
        );
        assert_eq!(tasks_by_queue("monitor").len(), 4);
    }
}
