use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    despacho_observability::init("despacho-api");

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });
    let api_key = std::env::var("API_KEY").unwrap_or_else(|_| {
        tracing::warn!("API_KEY not set; using insecure dev default");
        "secret".to_string()
    });

    let services = Arc::new(despacho_api::app::services::build_services_from_env().await?);
    let app = despacho_api::app::build_app(services, &jwt_secret, &api_key);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5002".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
