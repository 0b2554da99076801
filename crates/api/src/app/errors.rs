use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockline_infra::PlacementError;
use stockline_orders::FieldViolation;

use crate::app::dto::ShortfallResponse;

pub fn placement_error_to_response(err: PlacementError) -> axum::response::Response {
    match err {
        PlacementError::Validation(violations) => validation_error(violations),
        PlacementError::InsufficientInventory(shortfalls) => {
            let variants: Vec<ShortfallResponse> = shortfalls.into_iter().map(ShortfallResponse::from).collect();
            (
                StatusCode::CONFLICT,
                axum::Json(json!({
                    "error": "insufficient_inventory",
                    "message": "one or more items are out of stock",
                    "variants": variants,
                })),
            )
                .into_response()
        }
        PlacementError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "order not found"),
        PlacementError::Transaction(msg) => {
            // Details stay in the logs.
            tracing::error!(error = %msg, "order transaction failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn validation_error(violations: Vec<FieldViolation>) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "error": "validation_error",
            "message": "request validation failed",
            "fields": violations,
        })),
    )
        .into_response()
}

pub fn unsupported_version(version: &str) -> axum::response::Response {
    json_error(
        StatusCode::NOT_FOUND,
        "unsupported_version",
        format!("api version '{version}' is not supported"),
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
