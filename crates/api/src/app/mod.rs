//! HTTP API application wiring (Axum router + service wiring).
//!
//! Folder layout:
//! - `services.rs`: infrastructure wiring (broker, stores, dispatcher, workflow)
//! - `routes/`: HTTP routes + handlers (one file per resource area)
//! - `dto.rs`: request DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use despacho_auth::{Hs256JwtValidator, ServiceApiKey};

use crate::middleware::AuthState;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app(services: Arc<AppServices>, jwt_secret: &str, api_key: &str) -> Router {
    let auth_state = AuthState {
        jwt: Arc::new(Hs256JwtValidator::new(jwt_secret.as_bytes())),
        api_key: ServiceApiKey::new(api_key),
    };

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router(auth_state))
        .layer(Extension(services))
        .layer(ServiceBuilder::new())
}
