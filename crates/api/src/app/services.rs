use std::sync::Arc;

use sqlx::PgPool;

use despacho_crypto::InternalSigningKey;
use despacho_infra::{
    AlwaysAvailable, AuthorityClient, Broker, ConfirmationWorkflow, DownstreamAvailability,
    EntregaStore, HttpAuthorityClient, InMemoryBroker, InMemoryEntregaStore, PostgresEntregaStore,
    RedisBroker, SimulatedFlaky, TaskDispatcher,
};

/// Everything the handlers need, wired once at startup and injected as an
/// extension. No process-wide singletons.
pub struct AppServices {
    pub dispatcher: Arc<TaskDispatcher>,
    pub workflow: ConfirmationWorkflow,
    pub entregas: Arc<dyn EntregaStore>,
}

impl AppServices {
    /// Explicit wiring; used directly by tests with in-memory collaborators.
    pub fn new(
        broker: Arc<dyn Broker>,
        entregas: Arc<dyn EntregaStore>,
        authority: Arc<dyn AuthorityClient>,
        availability: Arc<dyn DownstreamAvailability>,
        signing_key: InternalSigningKey,
    ) -> Self {
        let dispatcher = Arc::new(TaskDispatcher::new(broker, signing_key));
        let workflow = ConfirmationWorkflow::new(dispatcher.clone(), authority, availability);
        Self {
            dispatcher,
            workflow,
            entregas,
        }
    }
}

/// Environment-driven wiring for the real process.
///
/// `REDIS_URL`/`DATABASE_URL` select the durable broker and store; without
/// them the process runs on in-memory infrastructure (dev only).
pub async fn build_services_from_env() -> anyhow::Result<AppServices> {
    let signing_key = InternalSigningKey::new(
        std::env::var("INTERNAL_SIGNING_KEY").unwrap_or_else(|_| {
            tracing::warn!("INTERNAL_SIGNING_KEY not set; using insecure dev default");
            "dev-internal-key".to_string()
        }),
    );

    let broker: Arc<dyn Broker> = match std::env::var("REDIS_URL") {
        Ok(url) => Arc::new(RedisBroker::new(&url)?),
        Err(_) => {
            tracing::warn!("REDIS_URL not set; using in-memory broker (dev only)");
            InMemoryBroker::arc()
        }
    };

    let entregas: Arc<dyn EntregaStore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = PgPool::connect(&url).await?;
            Arc::new(PostgresEntregaStore::new(pool))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory delivery store (dev only)");
            InMemoryEntregaStore::arc()
        }
    };

    let authority_url = std::env::var("AUTHORITY_URL")
        .unwrap_or_else(|_| "http://m-autorizador:5003".to_string());
    let api_key = std::env::var("API_KEY").unwrap_or_else(|_| "secret".to_string());
    let authority: Arc<dyn AuthorityClient> =
        Arc::new(HttpAuthorityClient::new(authority_url, api_key));

    // The flaky probe reproduces the reference environment; set the
    // probability to 0 (or leave it unset) for a dependable downstream.
    let availability: Arc<dyn DownstreamAvailability> = match std::env::var("FAILURE_PROBABILITY")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
    {
        Some(p) if p > 0.0 => Arc::new(SimulatedFlaky::new(p)),
        _ => Arc::new(AlwaysAvailable),
    };

    Ok(AppServices::new(
        broker,
        entregas,
        authority,
        availability,
        signing_key,
    ))
}
