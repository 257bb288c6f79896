use axum::Router;

use crate::middleware::AuthState;

pub mod entregas;
pub mod system;
pub mod tareas;

/// Router for all resource endpoints. Auth is applied per group: the
/// confirmation entry point requires a JWT, the task-submission boundary a
/// service credential; reads stay open.
pub fn router(auth_state: AuthState) -> Router {
    Router::new()
        .merge(entregas::router(auth_state.clone()))
        .merge(tareas::router(auth_state))
}
