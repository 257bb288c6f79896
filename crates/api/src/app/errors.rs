use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use despacho_infra::WorkflowError;

/// Map a confirmation workflow rejection to its HTTP response.
///
/// There is deliberately no 500 branch: transient downstream failure is
/// absorbed into the pending/reconciling path before this is ever reached.
pub fn workflow_error_to_response(err: WorkflowError) -> axum::response::Response {
    match err {
        WorkflowError::MissingField(e) => {
            json_error(StatusCode::BAD_REQUEST, "missing_field", e.to_string())
        }
        WorkflowError::InvalidSignature => {
            json_error(StatusCode::FORBIDDEN, "invalid_signature", "Firma no válida")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
