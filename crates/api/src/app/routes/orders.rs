use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use stockline_core::OrderId;

use crate::app::registry::{HandlerFuture, HandlerRegistry, Operation, OperationRequest, RouteTable};
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/api/:version/orders", get(list_orders).post(create_order))
        .route("/api/:version/orders/:id", get(get_order))
}

/// Register the order handlers. They serve every accepted version until a version
/// registers its own.
pub fn register(registry: &mut HandlerRegistry) {
    registry
        .register(None, Operation::CreateOrder, create_order_default)
        .register(None, Operation::GetOrder, get_order_default)
        .register(None, Operation::ListOrders, list_orders_default);
}

// -------------------------
// Axum entry points: resolve the versioned handler, then delegate.
// -------------------------

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(routes): Extension<Arc<RouteTable>>,
    Path(version): Path<String>,
    body: Result<Json<dto::CreateOrderRequest>, JsonRejection>,
) -> axum::response::Response {
    let Some(route) = routes.get(&version, Operation::CreateOrder) else {
        return errors::unsupported_version(&version);
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text());
        }
    };
    (route.handler)(services, OperationRequest::Create(body)).await
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(routes): Extension<Arc<RouteTable>>,
    Path((version, id)): Path<(String, String)>,
) -> axum::response::Response {
    let Some(route) = routes.get(&version, Operation::GetOrder) else {
        return errors::unsupported_version(&version);
    };
    (route.handler)(services, OperationRequest::Get { id }).await
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(routes): Extension<Arc<RouteTable>>,
    Path(version): Path<String>,
    Query(params): Query<dto::ListOrdersParams>,
) -> axum::response::Response {
    let Some(route) = routes.get(&version, Operation::ListOrders) else {
        return errors::unsupported_version(&version);
    };
    (route.handler)(services, OperationRequest::List(params)).await
}

// -------------------------
// Handlers
// -------------------------

fn create_order_default(services: Arc<AppServices>, request: OperationRequest) -> HandlerFuture {
    Box::pin(async move {
        let OperationRequest::Create(body) = request else {
            return mismatched(Operation::CreateOrder);
        };
        let order = match body.into_new_order() {
            Ok(o) => o,
            Err(violations) => return errors::validation_error(violations),
        };

        match services.placement.place(order.clone()).await {
            Ok(receipt) => (
                StatusCode::CREATED,
                Json(dto::CreateOrderResponse::new(&receipt, &order)),
            )
                .into_response(),
            Err(e) => errors::placement_error_to_response(e),
        }
    })
}

fn get_order_default(services: Arc<AppServices>, request: OperationRequest) -> HandlerFuture {
    Box::pin(async move {
        let OperationRequest::Get { id } = request else {
            return mismatched(Operation::GetOrder);
        };
        let order_id: OrderId = match id.parse() {
            Ok(v) => v,
            Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"),
        };

        match services.placement.get(order_id).await {
            Ok(order) => (StatusCode::OK, Json(dto::OrderResponse::from(order))).into_response(),
            Err(e) => errors::placement_error_to_response(e),
        }
    })
}

fn list_orders_default(services: Arc<AppServices>, request: OperationRequest) -> HandlerFuture {
    Box::pin(async move {
        let OperationRequest::List(params) = request else {
            return mismatched(Operation::ListOrders);
        };
        let page = params.page_request();

        match services.placement.list(params.search, page).await {
            Ok((orders, metadata)) => (
                StatusCode::OK,
                Json(dto::ListOrdersResponse {
                    orders: orders.into_iter().map(dto::OrderResponse::from).collect(),
                    metadata,
                }),
            )
                .into_response(),
            Err(e) => errors::placement_error_to_response(e),
        }
    })
}

fn mismatched(operation: Operation) -> axum::response::Response {
    tracing::error!(?operation, "handler received a request for another operation");
    errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
}
