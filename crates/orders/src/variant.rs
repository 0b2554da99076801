use serde::{Deserialize, Serialize};

use stockline_core::{Money, ProductId, VariantId};

/// Inventory-bearing unit, owned by the catalog.
///
/// The engine only reads `quantity` and decrements it through a guarded update;
/// it never writes it unconditionally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub name: String,
    pub product_name: String,
    pub price: Money,
    pub discount_price: Option<Money>,
    pub quantity: i64,
    pub active: bool,
}

impl Variant {
    pub fn new(product_name: impl Into<String>, name: impl Into<String>, price: Money, quantity: i64) -> Self {
        Self {
            id: VariantId::new(),
            product_id: ProductId::new(),
            name: name.into(),
            product_name: product_name.into(),
            price,
            discount_price: None,
            quantity,
            active: true,
        }
    }
}
