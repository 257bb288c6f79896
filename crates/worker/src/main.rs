//! Worker process: consumes broker queues and executes the task handlers.

use std::sync::Arc;

use despacho_crypto::{FieldCipher, InternalSigningKey};
use despacho_infra::worker::handlers::{
    GenerarReporteHandler, GenerateMetricsHandler, HealthCheckHandler, LogActivityHandler,
    PingLogisticaHandler, ProcesarEntregaHandler, ValidarInventarioHandler,
};
use despacho_infra::{
    Broker, EntregaStore, HttpRetrySubmitter, InMemoryBroker, InMemoryEntregaStore,
    PostgresEntregaStore, RedisBroker, RetryLoop, RetryPolicy, Worker,
};
use despacho_tasks::names;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    despacho_observability::init("despacho-worker");

    let worker_name =
        std::env::var("WORKER_NAME").unwrap_or_else(|_| "logistica_worker".to_string());

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
            let pool = sqlx::PgPool::connect(&url).await?;
            Arc::new(PostgresEntregaStore::new(pool))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory delivery store (dev only)");
            InMemoryEntregaStore::arc()
        }
    };

    let cipher = FieldCipher::new(&std::env::var("PRIVATE_KEY").unwrap_or_else(|_| {
        tracing::warn!("PRIVATE_KEY not set; using insecure dev default");
        "dev-private-key".to_string()
    }));

    let api_key = std::env::var("API_KEY").unwrap_or_else(|_| "secret".to_string());
    let retry_endpoint = std::env::var("RETRY_ENDPOINT")
        .unwrap_or_else(|_| "http://m-logistica-inventario:5002/tareas".to_string());
    let logistica_url = std::env::var("LOGISTICA_URL")
        .unwrap_or_else(|_| "http://m-logistica-inventario:5002".to_string());

    let retry_policy = RetryPolicy::default();
    let retry = RetryLoop::new(
        Arc::new(HttpRetrySubmitter::new(retry_endpoint, api_key, &retry_policy)),
        retry_policy,
    );

    let mut worker = Worker::new(worker_name, broker.clone(), signing_key);
    worker.register(
        names::PROCESAR_ENTREGA,
        Arc::new(ProcesarEntregaHandler::new(entregas, cipher, retry)),
    );
    worker.register(names::VALIDAR_INVENTARIO, Arc::new(ValidarInventarioHandler));
    worker.register(names::GENERAR_REPORTE, Arc::new(GenerarReporteHandler));
    worker.register(
        names::HEALTH_CHECK,
        Arc::new(HealthCheckHandler::new(broker.clone())),
    );
    worker.register(names::LOG_ACTIVITY, Arc::new(LogActivityHandler));
    worker.register(
        names::GENERATE_METRICS,
        Arc::new(GenerateMetricsHandler::new(broker)),
    );
    worker.register(
        names::PING_LOGISTICA,
        Arc::new(PingLogisticaHandler::new(logistica_url)),
    );

    tokio::select! {
        _ = worker.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
