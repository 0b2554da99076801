use axum::{routing::get, Router};

use crate::app::registry::HandlerRegistry;

pub mod orders;
pub mod system;

/// Router for the versioned API endpoints.
pub fn router() -> Router {
    Router::new().merge(orders::router())
}

/// Every versioned handler the API provides.
pub fn registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    orders::register(&mut registry);
    registry
}

/// Unversioned operational endpoints.
pub fn system_router() -> Router {
    Router::new().route("/health", get(system::health))
}
