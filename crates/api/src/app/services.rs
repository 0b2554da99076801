use std::sync::Arc;

use stockline_infra::{AppConfig, InMemoryOrderStore, OrderPlacement, OrderStore, PostgresOrderStore, StoreError};

/// Shared application services handed to every handler.
pub struct AppServices {
    pub placement: OrderPlacement<Arc<dyn OrderStore>>,
}

impl AppServices {
    pub fn new(store: Arc<dyn OrderStore>, config: &AppConfig) -> Self {
        let placement = OrderPlacement::new(store)
            .with_retry(config.retry)
            .with_deadline(config.order_deadline);
        Self { placement }
    }
}

/// Pick the store from configuration: Postgres when a database URL is set, otherwise
/// an empty in-memory store (dev only).
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    let store: Arc<dyn OrderStore> = match &config.database {
        Some(db) => {
            let store = PostgresOrderStore::connect(db).await?;
            store.migrate().await?;
            tracing::info!(max_connections = db.max_connections, "using postgres order store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("STOCKLINE_DATABASE_URL not set; using in-memory order store");
            Arc::new(InMemoryOrderStore::new())
        }
    };
    Ok(AppServices::new(store, config))
}
