use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use despacho_auth::{JwtValidator, Role, ServiceApiKey};

use crate::context::{CallerContext, PrincipalContext};

/// Header carrying the service API credential.
pub const API_KEY_HEADER: &str = "i-api-key";

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub api_key: ServiceApiKey,
}

/// Require a valid bearer JWT; installs a [`PrincipalContext`].
pub async fn jwt_auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let principal = principal_from_headers(&state, req.headers())?;
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// The task-submission boundary accepts either the service API key or a JWT
/// carrying both the `Admin` and `System` roles. Installs a [`CallerContext`].
pub async fn service_auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(presented) = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        if state.api_key.matches(presented) {
            req.extensions_mut().insert(CallerContext::Service);
            return Ok(next.run(req).await);
        }
        return Err(StatusCode::UNAUTHORIZED);
    }

    let principal = principal_from_headers(&state, req.headers())?;
    if !(principal.has_role(&Role::admin()) && principal.has_role(&Role::system())) {
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut()
        .insert(CallerContext::Principal(principal));
    Ok(next.run(req).await)
}

fn principal_from_headers(
    state: &AuthState,
    headers: &HeaderMap,
) -> Result<PrincipalContext, StatusCode> {
    let token = extract_bearer(headers)?;

    let claims = state
        .jwt
        .validate(token, Utc::now())
        .map_err(|_e| StatusCode::UNAUTHORIZED)?;

    Ok(PrincipalContext::new(
        claims.sub,
        claims.nombre.clone(),
        claims.roles.clone(),
    ))
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
