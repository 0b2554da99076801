//! Infrastructure layer: order storage, placement coordination and configuration.

pub mod config;
pub mod order_store;
pub mod placement;

pub use config::{AppConfig, ConfigError, DatabaseConfig};
pub use order_store::{
    FailPoint, InMemoryOrderStore, OrderPage, OrderQuery, OrderStore, PostgresOrderStore, StoreError,
};
pub use placement::{OrderPlacement, PlacementError, RetryConfig};
