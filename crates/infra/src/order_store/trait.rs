use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;

use stockline_core::{OrderId, VariantId};
use stockline_orders::{NewOrder, Order, OrderReceipt, Shortfall};

use super::query::{OrderPage, OrderQuery};

/// Order store operation error.
///
/// `Insufficient` is a business outcome; every other variant is an infrastructure
/// failure. Whatever the variant, a failed `place_order` has had no effect on the store.
///
/// ## Error Categories
///
/// - **Insufficient**: one or more demand lines cannot be satisfied (not retryable)
/// - **Conflict**: lock timeout, serialization failure or deadlock (retryable from `Begin`)
/// - **Unavailable**: pool closed, IO failure, anything the store could not complete
/// - **Corrupt**: a persisted row could not be decoded or violated a constraint
/// - **DeadlineExceeded**: the deadline passed before the order was staged (not retryable)
/// - **Injected**: a configured fault (in-memory store only)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("insufficient inventory for {} variant(s)", .0.len())]
    Insufficient(Vec<Shortfall>),

    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("deadline exceeded before commit")]
    DeadlineExceeded,

    #[error("injected fault: {0}")]
    Injected(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Transactional order persistence over a shared inventory ledger.
///
/// ## Placement Semantics
///
/// `place_order()` runs one unit of work:
///
/// ```text
/// Begin → Evaluate → Decrement → WriteHeader → WriteItems → Commit
///            │           │            │             │
///            └───────────┴────────────┴─────────────┴──→ Abort (no effect)
/// ```
///
/// - **Evaluate** reads remaining quantities for the distinct variants of the basket
/// - **Decrement** is a single guarded write per variant (`remaining >= requested` is
///   re-checked by the store at write time); a line that did not apply is treated as
///   insufficient inventory
/// - **WriteHeader / WriteItems** persist the order with status `Accepted`
///
/// No intermediate state is observable by other transactions.
///
/// The `deadline` bounds `Begin` through `WriteItems`. Once the order is fully staged the
/// commit always runs to completion, so a deadline can never report failure for an order
/// that was in fact committed.
///
/// ## Read Semantics
///
/// - `fetch_order()` returns `None` when no such order exists
/// - `list_orders()` orders by creation time descending; `total` counts every match,
///   independent of the page window
///
/// ## Implementation Requirements
///
/// Implementations must not rely on an application-level lock spanning several units of
/// work; correctness comes from the store's own transactional guarantees.
#[async_trait::async_trait]
pub trait OrderStore: Send + Sync {
    /// Reserve inventory and record the order atomically.
    async fn place_order(&self, order: &NewOrder, deadline: Instant) -> Result<OrderReceipt, StoreError>;

    /// Load an order with its enriched items.
    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Load a page of orders plus the count of all matching orders.
    async fn list_orders(&self, query: &OrderQuery) -> Result<OrderPage, StoreError>;

    /// Current remaining quantity of a variant (`None` if it does not exist).
    async fn remaining(&self, variant_id: VariantId) -> Result<Option<i64>, StoreError>;
}

#[async_trait::async_trait]
impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    async fn place_order(&self, order: &NewOrder, deadline: Instant) -> Result<OrderReceipt, StoreError> {
        (**self).place_order(order, deadline).await
    }

    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).fetch_order(order_id).await
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<OrderPage, StoreError> {
        (**self).list_orders(query).await
    }

    async fn remaining(&self, variant_id: VariantId) -> Result<Option<i64>, StoreError> {
        (**self).remaining(variant_id).await
    }
}
