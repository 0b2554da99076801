//! Postgres-backed order store implementation.
//!
//! This module persists orders and decrements the shared inventory ledger inside a
//! single Postgres transaction per placement.
//!
//! ## Concurrency Control
//!
//! Two mechanisms close the check-then-act race between evaluation and decrement:
//!
//! 1. Evaluation reads the demanded variant rows `FOR UPDATE` (in variant id order, so
//!    two overlapping baskets always lock in the same order). The locks are held until
//!    commit or rollback.
//! 2. The decrement is a single guarded `UPDATE ... WHERE quantity >= requested
//!    RETURNING id`. Every demanded variant must come back in the returned set; a
//!    missing one is treated as insufficient inventory and the transaction is rolled back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (serialization failure) | `40001` | `Conflict` | Concurrent transaction could not be serialized |
//! | Database (deadlock detected) | `40P01` | `Conflict` | Lock cycle broken by the server |
//! | Database (lock not available) | `55P03` | `Conflict` | `lock_timeout` elapsed while waiting for a row lock |
//! | Database (integrity violation) | `23xxx` | `Corrupt` | Constraint rejected a row (e.g. negative quantity) |
//! | Database (other) | Any other | `Unavailable` | Other database errors |
//! | PoolClosed / PoolTimedOut / Io / other | N/A | `Unavailable` | Connection problems |
//!
//! ## Deadline
//!
//! The placement deadline bounds everything up to the item insert. A staged transaction
//! is always committed, so an order is never committed behind a reported timeout.
//!
//! ## Thread Safety
//!
//! `PostgresOrderStore` is `Send + Sync` and cheap to clone; all operations go through
//! the SQLx connection pool.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tokio::time::Instant;
use tracing::{debug, instrument, Span};
use uuid::Uuid;

use stockline_core::{Money, OrderId, VariantId};
use stockline_orders::{
    Availability, BasketLine, Demand, NewOrder, Order, OrderItem, OrderReceipt, OrderStatus, Shortfall,
    Variant,
};

use super::query::{OrderPage, OrderQuery};
use super::r#trait::{OrderStore, StoreError};
use crate::config::DatabaseConfig;

const SCHEMA: &str = include_str!("../../migrations/0001_orders.sql");

/// Postgres-backed order store.
#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: Arc<PgPool>,
    lock_timeout: Option<Duration>,
}

impl PostgresOrderStore {
    /// Create a new PostgresOrderStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            lock_timeout: None,
        }
    }

    /// Connect a pool sized from configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        Ok(Self {
            pool: Arc::new(pool),
            lock_timeout: Some(config.lock_timeout),
        })
    }

    /// Bound how long a placement waits for a variant row lock before failing with
    /// a retryable `Conflict`.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the engine's tables if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    /// Insert or replace a catalog variant together with its owning product (tests/dev).
    #[instrument(skip(self, variant), fields(variant_id = %variant.id), err)]
    pub async fn seed_variant(&self, variant: &Variant) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO products (id, name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(variant.product_id.as_uuid())
        .bind(&variant.product_name)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("seed_product", e))?;

        sqlx::query(
            r#"
            INSERT INTO variants (id, name, mrp, discount_price, quantity, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                mrp = EXCLUDED.mrp,
                discount_price = EXCLUDED.discount_price,
                quantity = EXCLUDED.quantity,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(variant.id.as_uuid())
        .bind(&variant.name)
        .bind(variant.price.minor())
        .bind(variant.discount_price.map(Money::minor))
        .bind(variant.quantity)
        .bind(variant.active)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("seed_variant", e))?;

        sqlx::query(
            r#"
            INSERT INTO product_variant_mapping (product_id, variant_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(variant.product_id.as_uuid())
        .bind(variant.id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("seed_mapping", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn load_items(
        &self,
        order_ids: &[Uuid],
    ) -> Result<HashMap<OrderId, Vec<OrderItem>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                oi.order_id,
                oi.variant_id,
                oi.quantity,
                oi.price,
                v.name AS variant_name,
                p.name AS product_name
            FROM order_items oi
            LEFT JOIN variants v ON v.id = oi.variant_id
            LEFT JOIN LATERAL (
                SELECT pr.name
                FROM product_variant_mapping pvm
                JOIN products pr ON pr.id = pvm.product_id
                WHERE pvm.variant_id = oi.variant_id
                ORDER BY pr.name
                LIMIT 1
            ) p ON TRUE
            WHERE oi.order_id = ANY($1)
            ORDER BY oi.order_id, oi.line_no
            "#,
        )
        .bind(order_ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_items", e))?;

        let mut by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let item = OrderItemRow::from_row(&row)
                .map_err(|e| StoreError::Corrupt(format!("failed to decode order item row: {e}")))?;
            by_order
                .entry(OrderId::from_uuid(item.order_id))
                .or_default()
                .push(item.into());
        }
        Ok(by_order)
    }

    /// `Begin` through `WriteItems`. Dropping the returned transaction rolls it back.
    async fn stage(&self, order: &NewOrder) -> Result<(Transaction<'static, Postgres>, OrderReceipt), StoreError> {
        let span = Span::current();
        let demand = order.basket.demand();

        // Begin
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        if let Some(timeout) = self.lock_timeout {
            // SET does not take bind parameters; the value is a formatted integer.
            sqlx::query(&format!("SET LOCAL lock_timeout = {}", timeout.as_millis()))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;
        }

        // Evaluate
        let remaining = lock_remaining(&mut tx, &demand).await?;
        if let Availability::Insufficient(shortfalls) = Availability::evaluate(&demand, &remaining) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Insufficient(shortfalls));
        }

        // Decrement
        let applied = guarded_decrement(&mut tx, &demand).await?;
        let missed: Vec<Shortfall> = demand
            .iter()
            .filter(|(id, _)| !applied.contains(id))
            .map(|(variant_id, requested)| Shortfall {
                variant_id,
                requested,
                remaining: remaining.get(&variant_id).copied(),
            })
            .collect();
        if !missed.is_empty() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Insufficient(missed));
        }

        // Write header + items
        let order_id = OrderId::new();
        span.record("order_id", tracing::field::display(order_id));
        insert_header(&mut tx, order_id, order.total, Utc::now()).await?;
        insert_items(&mut tx, order_id, order.basket.lines()).await?;

        let receipt = OrderReceipt {
            order_id,
            status: OrderStatus::Accepted,
            total: order.total,
        };
        Ok((tx, receipt))
    }
}

#[async_trait::async_trait]
impl OrderStore for PostgresOrderStore {
    #[instrument(skip(self, order, deadline), fields(lines = order.basket.len(), order_id = tracing::field::Empty), err)]
    async fn place_order(&self, order: &NewOrder, deadline: Instant) -> Result<OrderReceipt, StoreError> {
        let (tx, receipt) = tokio::time::timeout_at(deadline, self.stage(order))
            .await
            .map_err(|_| StoreError::DeadlineExceeded)??;

        // Commit
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        debug!(order_id = %receipt.order_id, "order committed");

        Ok(receipt)
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, status, order_total, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_order", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let header = OrderHeaderRow::from_row(&row)
            .map_err(|e| StoreError::Corrupt(format!("failed to decode order row: {e}")))?;

        let mut items = self.load_items(&[header.id]).await?;
        let items = items.remove(&order_id).unwrap_or_default();
        header.into_order(items).map(Some)
    }

    #[instrument(skip(self), fields(search = ?query.search, limit = query.limit, offset = query.offset), err)]
    async fn list_orders(&self, query: &OrderQuery) -> Result<OrderPage, StoreError> {
        let pattern = query.like_pattern();

        let total: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM orders o
            WHERE $1::text IS NULL OR EXISTS (
                SELECT 1
                FROM order_items oi
                JOIN product_variant_mapping pvm ON pvm.variant_id = oi.variant_id
                JOIN products p ON p.id = pvm.product_id
                WHERE oi.order_id = o.id AND p.name ILIKE $1
            )
            "#,
        )
        .bind(pattern.as_deref())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_orders", e))?
        .try_get("total")
        .map_err(|e| StoreError::Corrupt(format!("failed to read count: {e}")))?;

        let rows = sqlx::query(
            r#"
            SELECT o.id, o.status, o.order_total, o.created_at
            FROM orders o
            WHERE $1::text IS NULL OR EXISTS (
                SELECT 1
                FROM order_items oi
                JOIN product_variant_mapping pvm ON pvm.variant_id = oi.variant_id
                JOIN products p ON p.id = pvm.product_id
                WHERE oi.order_id = o.id AND p.name ILIKE $1
            )
            ORDER BY o.created_at DESC, o.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(pattern.as_deref())
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        let headers = rows
            .iter()
            .map(OrderHeaderRow::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Corrupt(format!("failed to decode order row: {e}")))?;

        if headers.is_empty() {
            return Ok(OrderPage {
                orders: Vec::new(),
                total,
            });
        }

        let ids: Vec<Uuid> = headers.iter().map(|h| h.id).collect();
        let mut items = self.load_items(&ids).await?;

        let orders = headers
            .into_iter()
            .map(|h| {
                let order_items = items.remove(&OrderId::from_uuid(h.id)).unwrap_or_default();
                h.into_order(order_items)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(OrderPage { orders, total })
    }

    async fn remaining(&self, variant_id: VariantId) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT quantity FROM variants WHERE id = $1")
            .bind(variant_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("remaining", e))?;

        row.map(|r| r.try_get::<i64, _>("quantity"))
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("failed to read quantity: {e}")))
    }
}

/// Read remaining quantities for the demanded variants, locking their rows.
async fn lock_remaining(
    tx: &mut Transaction<'_, Postgres>,
    demand: &Demand,
) -> Result<HashMap<VariantId, i64>, StoreError> {
    let ids: Vec<Uuid> = demand.iter().map(|(id, _)| *id.as_uuid()).collect();

    let rows = sqlx::query(
        r#"
        SELECT id, quantity
        FROM variants
        WHERE id = ANY($1)
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_remaining", e))?;

    let mut remaining = HashMap::with_capacity(rows.len());
    for row in rows {
        let id: Uuid = row
            .try_get("id")
            .map_err(|e| StoreError::Corrupt(format!("failed to read variant id: {e}")))?;
        let quantity: i64 = row
            .try_get("quantity")
            .map_err(|e| StoreError::Corrupt(format!("failed to read quantity: {e}")))?;
        remaining.insert(VariantId::from_uuid(id), quantity);
    }
    Ok(remaining)
}

/// Apply the whole demand as one guarded multi-row update.
///
/// Returns the variants whose row was actually decremented.
async fn guarded_decrement(
    tx: &mut Transaction<'_, Postgres>,
    demand: &Demand,
) -> Result<HashSet<VariantId>, StoreError> {
    let (ids, quantities): (Vec<Uuid>, Vec<i64>) =
        demand.iter().map(|(id, qty)| (*id.as_uuid(), qty)).unzip();

    let rows = sqlx::query(
        r#"
        UPDATE variants AS v
        SET quantity = v.quantity - d.qty
        FROM UNNEST($1::uuid[], $2::bigint[]) AS d(id, qty)
        WHERE v.id = d.id AND v.quantity >= d.qty
        RETURNING v.id
        "#,
    )
    .bind(&ids)
    .bind(&quantities)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("guarded_decrement", e))?;

    rows.iter()
        .map(|r| r.try_get::<Uuid, _>("id").map(VariantId::from_uuid))
        .collect::<Result<HashSet<_>, _>>()
        .map_err(|e| StoreError::Corrupt(format!("failed to read decremented id: {e}")))
}

async fn insert_header(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
    total: Money,
    created_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, status, order_total, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(order_id.as_uuid())
    .bind(OrderStatus::Accepted.as_str())
    .bind(total.minor())
    .bind(created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_order", e))?;
    Ok(())
}

/// Insert all lines in one statement, preserving basket order via `line_no`.
async fn insert_items(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
    lines: &[BasketLine],
) -> Result<(), StoreError> {
    if lines.is_empty() {
        return Ok(());
    }

    let line_nos: Vec<i32> = (1..).take(lines.len()).collect();
    let variant_ids: Vec<Uuid> = lines.iter().map(|l| *l.variant_id.as_uuid()).collect();
    let quantities: Vec<i64> = lines.iter().map(|l| l.quantity).collect();
    let prices: Vec<i64> = lines.iter().map(|l| l.price.minor()).collect();

    let result = sqlx::query(
        r#"
        INSERT INTO order_items (order_id, line_no, variant_id, quantity, price)
        SELECT $1, t.line_no, t.variant_id, t.quantity, t.price
        FROM UNNEST($2::int4[], $3::uuid[], $4::bigint[], $5::bigint[])
            AS t(line_no, variant_id, quantity, price)
        "#,
    )
    .bind(order_id.as_uuid())
    .bind(&line_nos)
    .bind(&variant_ids)
    .bind(&quantities)
    .bind(&prices)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_order_items", e))?;

    if result.rows_affected() != lines.len() as u64 {
        return Err(StoreError::Corrupt(format!(
            "inserted {} of {} order items",
            result.rows_affected(),
            lines.len()
        )));
    }
    Ok(())
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // serialization_failure, deadlock_detected, lock_not_available
                Some("40001") | Some("40P01") | Some("55P03") => StoreError::Conflict(msg),
                Some(code) if code.starts_with("23") => StoreError::Corrupt(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("timed out acquiring connection in {}", operation))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}

// SQLx row types

#[derive(Debug)]
struct OrderHeaderRow {
    id: Uuid,
    status: String,
    order_total: i64,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for OrderHeaderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderHeaderRow {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            order_total: row.try_get("order_total")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl OrderHeaderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, StoreError> {
        let status = self
            .status
            .parse::<OrderStatus>()
            .map_err(StoreError::Corrupt)?;
        Ok(Order {
            id: OrderId::from_uuid(self.id),
            status,
            items,
            total: Money::from_minor(self.order_total),
            created_at: self.created_at,
        })
    }
}

#[derive(Debug)]
struct OrderItemRow {
    order_id: Uuid,
    variant_id: Uuid,
    quantity: i64,
    price: i64,
    variant_name: Option<String>,
    product_name: Option<String>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for OrderItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderItemRow {
            order_id: row.try_get("order_id")?,
            variant_id: row.try_get("variant_id")?,
            quantity: row.try_get("quantity")?,
            price: row.try_get("price")?,
            variant_name: row.try_get("variant_name")?,
            product_name: row.try_get("product_name")?,
        })
    }
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            variant_id: VariantId::from_uuid(row.variant_id),
            quantity: row.quantity,
            price: Money::from_minor(row.price),
            variant_name: row.variant_name,
            product_name: row.product_name,
        }
    }
}
