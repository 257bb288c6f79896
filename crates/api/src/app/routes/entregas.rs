use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use despacho_core::{EntregaId, PedidoId};
use despacho_infra::EntregaStore;
use despacho_logistica::ConfirmacionInfo;

use crate::app::{dto, errors};
use crate::middleware::AuthState;

use super::super::services::AppServices;

pub fn router(auth_state: AuthState) -> Router {
    let confirm = Router::new()
        .route("/entrega/:id/confirmar", post(confirmar_entrega))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            crate::middleware::jwt_auth_middleware,
        ));

    Router::new()
        .route("/entregas", post(crear_entrega).get(listar_entregas))
        .route("/entrega/:id", get(obtener_entrega))
        .merge(confirm)
}

pub async fn crear_entrega(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CrearEntregaRequest>,
) -> axum::response::Response {
    match services
        .entregas
        .crear(PedidoId::new(body.pedido_id), body.direccion)
        .await
    {
        Ok(entrega) => (StatusCode::CREATED, Json(entrega)).into_response(),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
    }
}

pub async fn listar_entregas(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.entregas.listar().await {
        Ok(all) => Json(all).into_response(),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
    }
}

pub async fn obtener_entrega(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: EntregaId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid entrega id");
        }
    };

    match services.entregas.obtener(id).await {
        Ok(Some(entrega)) => Json(entrega).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"mensaje": "Entrega no encontrada"})),
        )
            .into_response(),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
    }
}

/// Externally facing confirmation entry point (JWT required).
pub async fn confirmar_entrega(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(info): Json<ConfirmacionInfo>,
) -> axum::response::Response {
    let id: EntregaId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid entrega id");
        }
    };

    match services.workflow.confirmar(id, 0, &info).await {
        Ok(outcome) => confirmation_response(StatusCode::OK, &outcome),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

/// `200` body: the dispatch result merged with the workflow's own fields,
/// the shape callers poll against.
pub fn confirmation_response(
    status: StatusCode,
    outcome: &despacho_infra::ConfirmationOutcome,
) -> axum::response::Response {
    let mut body = match serde_json::to_value(&outcome.dispatch) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    body.insert("message".to_string(), json!(outcome.message));
    body.insert("entrega_id".to_string(), json!(outcome.entrega_id));
    body.insert("estado".to_string(), json!(outcome.estado));
    body.insert("timestamp".to_string(), json!(outcome.timestamp));

    (status, Json(serde_json::Value::Object(body))).into_response()
}
