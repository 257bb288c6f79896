use serde::Deserialize;
use serde_json::Value;

use despacho_logistica::ConfirmacionInfo;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CrearEntregaRequest {
    pub pedido_id: i64,
    pub direccion: Option<String>,
}

/// Body of the task-submission boundary. `tipo` picks the task; the rest are
/// per-task fields, including the retry loop's re-entry parameters.
#[derive(Debug, Deserialize)]
pub struct TareaRequest {
    pub tipo: String,

    // procesar_entrega (also the retry re-entry path)
    pub entrega_id: Option<i64>,
    #[serde(rename = "_retry_count", default)]
    pub retry_count: u32,
    pub confirmacion_info: Option<ConfirmacionInfo>,

    // validar_inventario
    pub producto_id: Option<i64>,
    pub cantidad: Option<i64>,

    // generar_reporte
    pub fecha_inicio: Option<String>,
    pub fecha_fin: Option<String>,

    // log_activity
    pub activity_data: Option<Value>,
}
