use std::sync::Arc;

use anyhow::Context;

use stockline_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before logging init so `.env` can carry RUST_LOG.
    let dotenv = stockline_api::env::load_dotenv(None);
    stockline_observability::init();
    if let Err(e) = dotenv {
        tracing::warn!(error = %e, "ignoring unreadable .env file");
    }

    let config = AppConfig::from_env().context("invalid configuration")?;

    let services = stockline_api::app::services::build_services(&config)
        .await
        .context("failed to initialise order store")?;
    let app = stockline_api::app::build_app(&config, Arc::new(services)).context("failed to build routes")?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind 0.0.0.0:{}", config.port))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
