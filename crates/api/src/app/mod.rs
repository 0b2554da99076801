//! HTTP API application wiring (Axum router + service wiring).
//!
//! This folder is structured like:
//! - `services.rs`: store selection and the placement coordinator
//! - `registry.rs`: explicit (version, operation) → handler map, resolved at startup
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use stockline_infra::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod registry;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(config: &AppConfig, services: Arc<services::AppServices>) -> Result<Router, registry::RegistryError> {
    let route_table = registry::RouteTable::build(&routes::registry(), &config.accepted_versions)?;
    tracing::info!(
        versions = ?config.accepted_versions,
        routes = route_table.len(),
        "api routes resolved"
    );

    let api = routes::router()
        .layer(Extension(services))
        .layer(Extension(Arc::new(route_table)));

    Ok(Router::new()
        .merge(routes::system_router())
        .merge(api)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::trace_requests))))
}
