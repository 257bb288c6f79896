//! Client for the remote authorization authority's signature validation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Timeout on the synchronous validation call; a hung authority must not
/// stall a confirmation request indefinitely.
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("authority call failed: {0}")]
    Transport(String),
}

/// Remote signature validation seam.
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Ask the authority whether `firma` is a valid signature over `payload`.
    ///
    /// A structurally valid call answers 200 with a `firma_valida` flag; any
    /// non-200 answer means the signature could not be confirmed.
    async fn validate_signature(&self, payload: &Value, firma: &str)
    -> Result<bool, AuthorityError>;
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    firma_valida: bool,
}

/// HTTP client against `POST {base_url}/validate-signature`.
#[derive(Debug, Clone)]
pub struct HttpAuthorityClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpAuthorityClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(VALIDATE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl AuthorityClient for HttpAuthorityClient {
    async fn validate_signature(
        &self,
        payload: &Value,
        firma: &str,
    ) -> Result<bool, AuthorityError> {
        let url = format!("{}/validate-signature", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("i-api-key", &self.api_key)
            .json(&json!({"payload": payload, "firma": firma}))
            .send()
            .await
            .map_err(|e| AuthorityError::Transport(e.to_string()))?;

        if response.status() != reqwest::StatusCode::OK {
            warn!(status = %response.status(), "authority rejected validation call");
            return Ok(false);
        }

        let body: ValidationResponse = response
            .json()
            .await
            .map_err(|e| AuthorityError::Transport(e.to_string()))?;
        Ok(body.firma_valida)
    }
}
