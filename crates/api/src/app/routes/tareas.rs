use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::{Map, Value, json};

use despacho_core::{EntregaId, TaskId};
use despacho_tasks::{DispatchResult, names};

use crate::app::{dto, errors};
use crate::middleware::AuthState;

use super::super::services::AppServices;
use super::entregas::confirmation_response;

pub fn router(auth_state: AuthState) -> Router {
    let submit = Router::new()
        .route("/tareas", post(enviar_tarea))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            crate::middleware::service_auth_middleware,
        ));

    Router::new()
        .route("/tareas", get(listar_tareas))
        .route("/tarea/:task_id", get(obtener_tarea))
        .merge(submit)
}

/// Task-submission boundary: `tipo` picks the task. `procesar_entrega` is
/// the retry loop's re-entry path and re-runs the full confirmation
/// workflow, signature checks included.
pub async fn enviar_tarea(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::TareaRequest>,
) -> axum::response::Response {
    match body.tipo.as_str() {
        "procesar_entrega" => {
            let Some(entrega_id) = body.entrega_id else {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "missing_field",
                    "entrega_id es requerido",
                );
            };
            let Some(info) = body.confirmacion_info else {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "missing_field",
                    "confirmacion_info es requerido",
                );
            };

            match services
                .workflow
                .confirmar(EntregaId::new(entrega_id), body.retry_count, &info)
                .await
            {
                Ok(outcome) => confirmation_response(StatusCode::OK, &outcome),
                Err(e) => errors::workflow_error_to_response(e),
            }
        }

        "validar_inventario" => {
            let (Some(producto_id), Some(cantidad)) = (body.producto_id, body.cantidad) else {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "missing_field",
                    "producto_id y cantidad son requeridos",
                );
            };

            let result = services
                .dispatcher
                .dispatch(
                    names::VALIDAR_INVENTARIO,
                    vec![json!(producto_id), json!(cantidad)],
                    Map::new(),
                )
                .await;
            submitted("Validación enviada", &result)
        }

        "generar_reporte" => {
            let result = services
                .dispatcher
                .dispatch(
                    names::GENERAR_REPORTE,
                    vec![json!(body.fecha_inicio), json!(body.fecha_fin)],
                    Map::new(),
                )
                .await;
            submitted("Reporte enviado", &result)
        }

        "health_check" => {
            let result = services
                .dispatcher
                .dispatch(names::HEALTH_CHECK, vec![], Map::new())
                .await;
            submitted("Health check iniciado", &result)
        }

        "log_activity" => {
            let activity = body.activity_data.unwrap_or_else(|| json!({}));
            let result = services
                .dispatcher
                .dispatch(names::LOG_ACTIVITY, vec![activity], Map::new())
                .await;
            submitted("Log activity enviado", &result)
        }

        "generate_metrics" => {
            let result = services
                .dispatcher
                .dispatch(names::GENERATE_METRICS, vec![], Map::new())
                .await;
            submitted("Generación de métricas iniciada", &result)
        }

        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Tipo de tarea no válido",
                "available_tasks": services.dispatcher.list_available_tasks(),
            })),
        )
            .into_response(),
    }
}

pub async fn listar_tareas(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let listing = services.dispatcher.list_tasks().await;
    Json(listing).into_response()
}

pub async fn obtener_tarea(
    Extension(services): Extension<Arc<AppServices>>,
    Path(task_id): Path<String>,
) -> axum::response::Response {
    let task_id: TaskId = match task_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid task id");
        }
    };

    Json(services.dispatcher.get_result(task_id).await).into_response()
}

/// `202` body: the dispatch result merged with a human-readable message.
fn submitted(message: &str, result: &DispatchResult) -> axum::response::Response {
    let mut body = match serde_json::to_value(result) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    body.insert("message".to_string(), json!(message));

    (StatusCode::ACCEPTED, Json(Value::Object(body))).into_response()
}
