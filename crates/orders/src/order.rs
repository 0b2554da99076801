use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockline_core::{Money, OrderId, VariantId};

use crate::basket::{Basket, BasketLine};

/// Order status. Orders are created `Accepted`; no further lifecycle is modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Accepted,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Accepted => "Accepted",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Accepted" => Ok(OrderStatus::Accepted),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Order placement request: the basket plus the caller-supplied total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub basket: Basket,
    pub total: Money,
}

impl NewOrder {
    pub fn new(lines: Vec<BasketLine>, total: Money) -> Self {
        Self {
            basket: Basket::new(lines),
            total,
        }
    }

    /// Check the guarantees the engine relies on.
    ///
    /// Upstream validation should already have rejected these; a failure here means a
    /// malformed request reached the core. The caller-supplied total must equal the sum
    /// of line subtotals.
    pub fn validate(&self) -> Result<(), Vec<FieldViolation>> {
        let mut violations = Vec::new();

        if self.basket.is_empty() {
            violations.push(FieldViolation::new("items", "at least one item is required"));
        }
        if !self.total.is_positive() {
            violations.push(FieldViolation::new("total", "must be greater than zero"));
        }
        for (idx, line) in self.basket.lines().iter().enumerate() {
            if line.quantity <= 0 {
                violations.push(FieldViolation::new(
                    format!("items[{idx}].quantity"),
                    "must be greater than zero",
                ));
            }
            if !line.price.is_positive() {
                violations.push(FieldViolation::new(
                    format!("items[{idx}].price"),
                    "must be greater than zero",
                ));
            }
        }

        // Only meaningful once every line is individually well-formed.
        if violations.is_empty() {
            match self.basket.subtotal() {
                Ok(sum) if sum == self.total => {}
                Ok(sum) => violations.push(FieldViolation::new(
                    "total",
                    format!("total {} does not match sum of items {}", self.total, sum),
                )),
                Err(e) => violations.push(FieldViolation::new("total", e.to_string())),
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Result of a committed placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total: Money,
}

/// Persisted order line, enriched with display names on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub variant_id: VariantId,
    pub quantity: i64,
    pub price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

/// A committed order as reconstructed from its persisted rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total: Money,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Case-insensitive substring match against the items' product names.
    pub fn matches_product(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.items.iter().any(|item| {
            item.product_name
                .as_deref()
                .is_some_and(|name| name.to_lowercase().contains(&needle))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: i64, price: i64) -> BasketLine {
        BasketLine::new(VariantId::new(), quantity, Money::from_minor(price))
    }

    #[test]
    fn well_formed_order_passes_validation() {
        let order = NewOrder::new(vec![line(2, 1000), line(1, 500)], Money::from_minor(2500));
        assert!(order.validate().is_ok());
    }

    #[test]
    fn empty_basket_is_rejected() {
        let order = NewOrder::new(vec![], Money::from_minor(100));
        let violations = order.validate().unwrap_err();
        assert!(violations.iter().any(|v| v.field == "items"));
    }

    #[test]
    fn non_positive_quantity_and_price_are_reported_per_line() {
        let order = NewOrder::new(vec![line(0, 100), line(1, -5)], Money::from_minor(100));
        let fields: Vec<String> = order
            .validate()
            .unwrap_err()
            .into_iter()
            .map(|v| v.field)
            .collect();
        assert_eq!(fields, vec!["items[0].quantity", "items[1].price"]);
    }

    #[test]
    fn mismatched_total_is_rejected() {
        let order = NewOrder::new(vec![line(2, 1000)], Money::from_minor(1999));
        let violations = order.validate().unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "total");
        assert!(violations[0].message.contains("20.00"));
    }

    #[test]
    fn status_round_trips_through_its_name() {
        assert_eq!("Accepted".parse::<OrderStatus>().unwrap(), OrderStatus::Accepted);
        assert_eq!(OrderStatus::Accepted.to_string(), "Accepted");
        assert!("Shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn product_match_is_case_insensitive() {
        let order = Order {
            id: OrderId::new(),
            status: OrderStatus::Accepted,
            items: vec![OrderItem {
                variant_id: VariantId::new(),
                quantity: 1,
                price: Money::from_minor(100),
                variant_name: Some("Large".to_string()),
                product_name: Some("Cotton Shirt".to_string()),
            }],
            total: Money::from_minor(100),
            created_at: Utc::now(),
        };
        assert!(order.matches_product("shirt"));
        assert!(!order.matches_product("trousers"));
    }
}
