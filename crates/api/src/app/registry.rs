//! Versioned handler registry.
//!
//! Handlers are registered explicitly per `(version, operation)`. A version may leave an
//! operation unimplemented; resolution then falls back through older accepted versions
//! and finally to the unversioned default:
//!
//! ```text
//! resolve(v3, GetOrder) with accepted = [v1, v2, v3]
//!   (v3, GetOrder)? → (v2, GetOrder)? → (v1, GetOrder)? → (default, GetOrder)? → None
//! ```
//!
//! `RouteTable::build` performs every lookup once at startup, so request handling is a
//! single map access.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::response::Response;
use thiserror::Error;

use crate::app::dto::{CreateOrderRequest, ListOrdersParams};
use crate::app::services::AppServices;

/// API version label, `v` followed by a positive number (`v1`, `v2`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiVersion(String);

impl ApiVersion {
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        let valid = raw
            .strip_prefix('v')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) && n != "0");
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(RegistryError::InvalidVersion(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateOrder,
    GetOrder,
    ListOrders,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::CreateOrder, Operation::GetOrder, Operation::ListOrders];
}

/// Input handed to a resolved handler.
#[derive(Debug)]
pub enum OperationRequest {
    Create(CreateOrderRequest),
    Get { id: String },
    List(ListOrdersParams),
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Response> + Send>>;
pub type HandlerFn = fn(Arc<AppServices>, OperationRequest) -> HandlerFuture;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid api version '{0}' (expected v<number>)")]
    InvalidVersion(String),

    #[error("no accepted api versions configured")]
    NoVersions,
}

/// A handler together with the version it was registered under (`None` = default).
#[derive(Clone, Copy)]
pub struct Route {
    pub registered_for: Option<&'static str>,
    pub handler: HandlerFn,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("registered_for", &self.registered_for)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(Option<String>, Operation), Route>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for one version, or as the default when `version` is `None`.
    pub fn register(&mut self, version: Option<&'static str>, operation: Operation, handler: HandlerFn) -> &mut Self {
        self.handlers.insert(
            (version.map(str::to_string), operation),
            Route {
                registered_for: version,
                handler,
            },
        );
        self
    }

    /// Resolve `operation` for `requested`. Versions outside `accepted` never resolve.
    pub fn resolve(&self, requested: &ApiVersion, accepted: &[ApiVersion], operation: Operation) -> Option<Route> {
        let position = accepted.iter().position(|v| v == requested)?;

        accepted[..=position]
            .iter()
            .rev()
            .find_map(|v| self.handlers.get(&(Some(v.as_str().to_string()), operation)).copied())
            .or_else(|| self.handlers.get(&(None, operation)).copied())
    }
}

/// Every (accepted version, operation) pair resolved once.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<(String, Operation), Route>,
}

impl RouteTable {
    pub fn build(registry: &HandlerRegistry, accepted: &[String]) -> Result<Self, RegistryError> {
        if accepted.is_empty() {
            return Err(RegistryError::NoVersions);
        }
        let accepted = accepted
            .iter()
            .map(|v| ApiVersion::parse(v))
            .collect::<Result<Vec<_>, _>>()?;

        let mut routes = HashMap::new();
        for version in &accepted {
            for operation in Operation::ALL {
                if let Some(route) = registry.resolve(version, &accepted, operation) {
                    routes.insert((version.as_str().to_string(), operation), route);
                }
            }
        }
        Ok(Self { routes })
    }

    pub fn get(&self, version: &str, operation: Operation) -> Option<Route> {
        self.routes.get(&(version.to_string(), operation)).copied()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn noop(_: Arc<AppServices>, _: OperationRequest) -> HandlerFuture {
        Box::pin(async { StatusCode::NO_CONTENT.into_response() })
    }

    fn versions(raw: &[&str]) -> Vec<ApiVersion> {
        raw.iter().map(|v| ApiVersion::parse(v).unwrap()).collect()
    }

    #[test]
    fn version_labels_are_validated() {
        assert!(ApiVersion::parse("v1").is_ok());
        assert!(ApiVersion::parse("v12").is_ok());
        for bad in ["", "v", "v0", "1", "V1", "v1a", "latest"] {
            assert!(ApiVersion::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn newest_registered_version_not_above_request_wins() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(Some("v1"), Operation::GetOrder, noop)
            .register(Some("v3"), Operation::GetOrder, noop);
        let accepted = versions(&["v1", "v2", "v3"]);

        let pick = |v: &str| {
            registry
                .resolve(&ApiVersion::parse(v).unwrap(), &accepted, Operation::GetOrder)
                .and_then(|r| r.registered_for)
        };
        assert_eq!(pick("v1"), Some("v1"));
        assert_eq!(pick("v2"), Some("v1"));
        assert_eq!(pick("v3"), Some("v3"));
    }

    #[test]
    fn default_handler_is_the_last_fallback() {
        let mut registry = HandlerRegistry::new();
        registry.register(None, Operation::ListOrders, noop);
        let accepted = versions(&["v1", "v2"]);

        let route = registry
            .resolve(&ApiVersion::parse("v2").unwrap(), &accepted, Operation::ListOrders)
            .unwrap();
        assert_eq!(route.registered_for, None);
        assert!(registry
            .resolve(&ApiVersion::parse("v2").unwrap(), &accepted, Operation::CreateOrder)
            .is_none());
    }

    #[test]
    fn versions_outside_accepted_list_do_not_resolve() {
        let mut registry = HandlerRegistry::new();
        registry.register(None, Operation::GetOrder, noop);
        let accepted = versions(&["v1"]);

        assert!(registry
            .resolve(&ApiVersion::parse("v2").unwrap(), &accepted, Operation::GetOrder)
            .is_none());
    }

    #[test]
    fn route_table_covers_every_accepted_version() {
        let mut registry = HandlerRegistry::new();
        for op in Operation::ALL {
            registry.register(None, op, noop);
        }

        let table = RouteTable::build(&registry, &["v1".to_string(), "v2".to_string()]).unwrap();
        assert_eq!(table.len(), 6);
        assert!(table.get("v2", Operation::CreateOrder).is_some());
        assert!(table.get("v9", Operation::CreateOrder).is_none());

        assert_eq!(
            RouteTable::build(&registry, &["beta".to_string()]).unwrap_err(),
            RegistryError::InvalidVersion("beta".to_string())
        );
        assert_eq!(RouteTable::build(&registry, &[]).unwrap_err(), RegistryError::NoVersions);
    }
}
