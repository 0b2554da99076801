use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use stockline_core::{Money, VariantId};
use stockline_orders::{
    BasketLine, FieldViolation, NewOrder, Order, OrderItem, OrderReceipt, PageMeta, PageRequest, Shortfall,
};

// -------------------------
// Request DTOs
// -------------------------

/// Largest number of fractional digits an amount may carry (cents).
const MONEY_SCALE: u32 = 2;

/// Amounts are decimal major currency units (`25.0`, `19.99`).
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub items: Vec<OrderLineRequest>,
    pub total: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub variant_id: String,
    pub quantity: i64,
    pub price: Decimal,
}

/// Exact conversion to minor units; more than two fractional digits is rejected.
fn to_money(field: String, amount: Decimal) -> Result<Money, FieldViolation> {
    let amount = amount.normalize();
    if amount.scale() > MONEY_SCALE {
        return Err(FieldViolation {
            field,
            message: format!("at most {MONEY_SCALE} decimal places allowed, got {amount}"),
        });
    }
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|minor| minor.to_i64())
        .map(Money::from_minor)
        .ok_or_else(|| FieldViolation {
            field,
            message: format!("amount {amount} is out of range"),
        })
}

fn to_decimal(money: Money) -> Decimal {
    Decimal::new(money.minor(), MONEY_SCALE)
}

impl CreateOrderRequest {
    /// Resolve identifiers and amounts; range checks are left to `NewOrder::validate`.
    pub fn into_new_order(self) -> Result<NewOrder, Vec<FieldViolation>> {
        let mut violations = Vec::new();
        let mut lines = Vec::with_capacity(self.items.len());

        for (idx, item) in self.items.into_iter().enumerate() {
            let variant_id = item.variant_id.trim().parse::<VariantId>().map_err(|e| FieldViolation {
                field: format!("items[{idx}].variant_id"),
                message: e.to_string(),
            });
            let price = to_money(format!("items[{idx}].price"), item.price);
            match (variant_id, price) {
                (Ok(variant_id), Ok(price)) => lines.push(BasketLine::new(variant_id, item.quantity, price)),
                (variant_id, price) => violations.extend(variant_id.err().into_iter().chain(price.err())),
            }
        }
        let total = to_money("total".to_string(), self.total);

        match total {
            Ok(total) if violations.is_empty() => Ok(NewOrder::new(lines, total)),
            total => {
                violations.extend(total.err());
                Err(violations)
            }
        }
    }
}

/// Query string of the listing endpoint. Unparsable numbers fall back to the defaults.
#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    pub search: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListOrdersParams {
    pub fn page_request(&self) -> PageRequest {
        let number = |raw: &Option<String>| raw.as_deref().and_then(|s| s.trim().parse::<i64>().ok());
        PageRequest::new(number(&self.page), number(&self.limit))
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub variant_id: String,
    pub quantity: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            variant_id: item.variant_id.to_string(),
            quantity: item.quantity,
            price: to_decimal(item.price),
            variant_name: item.variant_name,
            product_name: item.product_name,
        }
    }
}

impl From<&BasketLine> for OrderItemResponse {
    fn from(line: &BasketLine) -> Self {
        Self {
            variant_id: line.variant_id.to_string(),
            quantity: line.quantity,
            price: to_decimal(line.price),
            variant_name: None,
            product_name: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub id: String,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

impl CreateOrderResponse {
    pub fn new(receipt: &OrderReceipt, order: &NewOrder) -> Self {
        Self {
            id: receipt.order_id.to_string(),
            status: receipt.status.to_string(),
            items: order.basket.lines().iter().map(OrderItemResponse::from).collect(),
            total: to_decimal(receipt.total),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            status: order.status.to_string(),
            items: order.items.into_iter().map(OrderItemResponse::from).collect(),
            total: to_decimal(order.total),
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListOrdersResponse {
    pub orders: Vec<OrderResponse>,
    /// Absent when nothing matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PageMeta>,
}

#[derive(Debug, Serialize)]
pub struct ShortfallResponse {
    pub variant_id: String,
    pub requested: i64,
    /// `null` when the variant does not exist.
    pub remaining: Option<i64>,
}

impl From<Shortfall> for ShortfallResponse {
    fn from(s: Shortfall) -> Self {
        Self {
            variant_id: s.variant_id.to_string(),
            requested: s.requested,
            remaining: s.remaining,
        }
    }
}
