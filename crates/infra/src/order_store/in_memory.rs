use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, instrument};

use stockline_core::{Money, OrderId, VariantId};
use stockline_orders::{
    Availability, Demand, NewOrder, Order, OrderItem, OrderReceipt, OrderStatus, Shortfall, Variant,
};

use super::query::{OrderPage, OrderQuery};
use super::r#trait::{OrderStore, StoreError};

/// Fault to inject into the next placements (tests/dev).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FailPoint {
    /// Abort after the guarded decrement has been applied to the unit of work.
    AfterDecrement,
    /// Fail the batched item write.
    ItemWrite,
    /// Report a transaction conflict for the next `times` placements.
    Conflict { times: u32 },
    /// Once, after `Evaluate`: another writer takes `quantity` units of `variant`.
    StockTakenBeforeDecrement { variant: VariantId, quantity: i64 },
}

#[derive(Debug, Clone)]
struct OrderRow {
    id: OrderId,
    status: OrderStatus,
    total: Money,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ItemRow {
    order_id: OrderId,
    variant_id: VariantId,
    quantity: i64,
    price: Money,
}

#[derive(Debug, Default)]
struct Tables {
    variants: HashMap<VariantId, Variant>,
    orders: Vec<OrderRow>,
    items: Vec<ItemRow>,
}

impl Tables {
    fn remaining_for(&self, demand: &Demand) -> HashMap<VariantId, i64> {
        demand
            .iter()
            .filter_map(|(id, _)| self.variants.get(&id).map(|v| (id, v.quantity)))
            .collect()
    }

    fn enrich(&self, row: &OrderRow) -> Order {
        let items = self
            .items
            .iter()
            .filter(|i| i.order_id == row.id)
            .map(|i| {
                let variant = self.variants.get(&i.variant_id);
                OrderItem {
                    variant_id: i.variant_id,
                    quantity: i.quantity,
                    price: i.price,
                    variant_name: variant.map(|v| v.name.clone()),
                    product_name: variant.map(|v| v.product_name.clone()),
                }
            })
            .collect();

        Order {
            id: row.id,
            status: row.status,
            items,
            total: row.total,
            created_at: row.created_at,
        }
    }
}

/// Writes of one placement. Nothing here is visible until `commit`.
#[derive(Debug, Default)]
struct UnitOfWork {
    decrements: Vec<(VariantId, i64)>,
    header: Option<OrderRow>,
    items: Vec<ItemRow>,
}

impl UnitOfWork {
    fn commit(self, tables: &mut Tables) {
        for (variant_id, qty) in self.decrements {
            if let Some(v) = tables.variants.get_mut(&variant_id) {
                v.quantity -= qty;
                debug_assert!(v.quantity >= 0, "guarded decrement drove {variant_id} negative");
            }
        }
        if let Some(header) = self.header {
            tables.orders.push(header);
        }
        tables.items.extend(self.items);
    }
}

/// In-memory order store.
///
/// Intended for tests/dev. A single async mutex over all tables is the unit of work:
/// it is held from `Begin` to `Commit`, and staged writes are dropped on any failure.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    tables: Mutex<Tables>,
    fail_point: StdMutex<Option<FailPoint>>,
    step_delay: Option<Duration>,
    commit_delay: Option<Duration>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep between the steps of each placement (widens race windows, trips deadlines).
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    /// Sleep after the order is staged, before it is committed (a slow commit round trip).
    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = Some(delay);
        self
    }

    /// Insert or replace a catalog variant (catalog management is out of scope).
    pub async fn upsert_variant(&self, variant: Variant) {
        self.tables.lock().await.variants.insert(variant.id, variant);
    }

    pub async fn variant(&self, variant_id: VariantId) -> Option<Variant> {
        self.tables.lock().await.variants.get(&variant_id).cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    pub fn set_fail_point(&self, point: Option<FailPoint>) -> Result<(), StoreError> {
        *self.lock_fail_point()? = point;
        Ok(())
    }

    fn lock_fail_point(&self) -> Result<std::sync::MutexGuard<'_, Option<FailPoint>>, StoreError> {
        self.fail_point
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn check_conflict(&self) -> Result<(), StoreError> {
        let mut fp = self.lock_fail_point()?;
        if let Some(FailPoint::Conflict { times }) = *fp {
            *fp = (times > 1).then(|| FailPoint::Conflict { times: times - 1 });
            return Err(StoreError::Conflict("could not serialize access".to_string()));
        }
        Ok(())
    }

    fn trip(&self, point: FailPoint) -> Result<(), StoreError> {
        if *self.lock_fail_point()? == Some(point) {
            return Err(StoreError::Injected(format!("{point:?}")));
        }
        Ok(())
    }

    async fn pause(&self) {
        if let Some(delay) = self.step_delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// `Begin` through `WriteItems`. The returned guard keeps the unit of work open
    /// until the caller commits or drops it.
    async fn stage(&self, order: &NewOrder) -> Result<(MutexGuard<'_, Tables>, UnitOfWork, OrderReceipt), StoreError> {
        // Begin
        let mut tables = self.tables.lock().await;
        self.check_conflict()?;
        let demand = order.basket.demand();

        // Evaluate
        let remaining = tables.remaining_for(&demand);
        if let Availability::Insufficient(shortfalls) = Availability::evaluate(&demand, &remaining) {
            return Err(StoreError::Insufficient(shortfalls));
        }
        self.take_competing_stock(&mut tables)?;
        self.pause().await;

        // Decrement: guarded per variant, every line must report one affected row.
        let mut uow = UnitOfWork::default();
        let mut shortfalls = Vec::new();
        for (variant_id, requested) in demand.iter() {
            let current = tables.variants.get(&variant_id).map(|v| v.quantity);
            match current {
                Some(q) if q >= requested => uow.decrements.push((variant_id, requested)),
                _ => shortfalls.push(Shortfall {
                    variant_id,
                    requested,
                    remaining: current,
                }),
            }
        }
        if !shortfalls.is_empty() {
            return Err(StoreError::Insufficient(shortfalls));
        }
        self.trip(FailPoint::AfterDecrement)?;
        self.pause().await;

        // Write header
        let header = OrderRow {
            id: OrderId::new(),
            status: OrderStatus::Accepted,
            total: order.total,
            created_at: Utc::now(),
        };
        let order_id = header.id;
        uow.header = Some(header);

        // Write items
        self.trip(FailPoint::ItemWrite)?;
        uow.items = order
            .basket
            .lines()
            .iter()
            .map(|line| ItemRow {
                order_id,
                variant_id: line.variant_id,
                quantity: line.quantity,
                price: line.price,
            })
            .collect();
        self.pause().await;

        let receipt = OrderReceipt {
            order_id,
            status: OrderStatus::Accepted,
            total: order.total,
        };
        Ok((tables, uow, receipt))
    }

    /// Apply a competing writer's committed decrement between `Evaluate` and `Decrement`.
    fn take_competing_stock(&self, tables: &mut Tables) -> Result<(), StoreError> {
        let mut fp = self.lock_fail_point()?;
        if let Some(FailPoint::StockTakenBeforeDecrement { variant, quantity }) = *fp {
            *fp = None;
            if let Some(v) = tables.variants.get_mut(&variant) {
                v.quantity = (v.quantity - quantity).max(0);
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl OrderStore for InMemoryOrderStore {
    #[instrument(skip(self, order, deadline), fields(lines = order.basket.len()), err)]
    async fn place_order(&self, order: &NewOrder, deadline: Instant) -> Result<OrderReceipt, StoreError> {
        let (mut tables, uow, receipt) = tokio::time::timeout_at(deadline, self.stage(order))
            .await
            .map_err(|_| StoreError::DeadlineExceeded)??;

        // Commit
        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }
        uow.commit(&mut tables);
        debug!(order_id = %receipt.order_id, "order committed");

        Ok(receipt)
    }

    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .map(|row| tables.enrich(row)))
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<OrderPage, StoreError> {
        let tables = self.tables.lock().await;

        let mut rows: Vec<&OrderRow> = tables.orders.iter().collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let matching: Vec<Order> = rows
            .into_iter()
            .map(|row| tables.enrich(row))
            .filter(|o| query.search.as_deref().is_none_or(|s| o.matches_product(s)))
            .collect();

        let total = matching.len() as i64;
        let orders = matching
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect();

        Ok(OrderPage { orders, total })
    }

    async fn remaining(&self, variant_id: VariantId) -> Result<Option<i64>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .variants
            .get(&variant_id)
            .map(|v| v.quantity))
    }
}
