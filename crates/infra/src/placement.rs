//! Order placement coordinator.
//!
//! `OrderPlacement` is the application-level entry point for placing and reading orders.
//! It owns no state of its own: atomicity and overselling protection come from the
//! store's unit of work. The coordinator adds what sits around a single attempt:
//!
//! ```text
//! NewOrder
//!   ↓
//! 1. Validate (non-empty basket, positive quantities/prices, total = Σ qty × price)
//!   ↓
//! 2. store.place_order() ──Conflict──→ back off, retry from Begin (bounded)
//!   ↓                    ──Insufficient──→ business outcome, never retried
//! 3. OrderReceipt
//! ```
//!
//! One deadline covers every attempt of step 2, backoff included. The store enforces it up
//! to the point where the order is fully staged; a staged order is always committed, so
//! a deadline failure guarantees nothing was written.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use stockline_core::OrderId;
use stockline_orders::{FieldViolation, NewOrder, Order, OrderReceipt, PageMeta, PageRequest, Shortfall};

use crate::order_store::{OrderQuery, OrderStore, StoreError};

/// Exponential backoff between attempts that failed with a transaction conflict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (1-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.max(1.0).powi(retry as i32 - 1);
        let millis = (self.base_delay.as_millis() as f64 * factor).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("insufficient inventory for {} variant(s)", .0.len())]
    InsufficientInventory(Vec<Shortfall>),

    #[error("order not found")]
    NotFound,

    /// The unit of work did not commit; nothing was written.
    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error("validation failed: {}", format_violations(.0))]
    Validation(Vec<FieldViolation>),
}

impl PlacementError {
    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlacementError::Transaction(_))
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PlacementError::InsufficientInventory(_)
                | PlacementError::NotFound
                | PlacementError::Validation(_)
        )
    }
}

impl From<StoreError> for PlacementError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Insufficient(shortfalls) => PlacementError::InsufficientInventory(shortfalls),
            StoreError::DeadlineExceeded => PlacementError::Transaction("deadline exceeded".to_string()),
            other => PlacementError::Transaction(other.to_string()),
        }
    }
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Places and reads orders through an `OrderStore`.
#[derive(Debug, Clone)]
pub struct OrderPlacement<S> {
    store: S,
    retry: RetryConfig,
    deadline: Duration,
}

impl<S> OrderPlacement<S>
where
    S: OrderStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryConfig::default(),
            deadline: Duration::from_secs(5),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate and place an order atomically.
    #[instrument(skip(self, order), fields(lines = order.basket.len(), total = %order.total))]
    pub async fn place(&self, order: NewOrder) -> Result<OrderReceipt, PlacementError> {
        order.validate().map_err(PlacementError::Validation)?;

        let deadline = Instant::now() + self.deadline;
        let mut attempt = 1;
        loop {
            match self.store.place_order(&order, deadline).await {
                Ok(receipt) => return Ok(receipt),
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_retry(attempt);
                    if Instant::now() + delay >= deadline {
                        return Err(self.deadline_exceeded());
                    }
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying order placement");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(StoreError::Insufficient(shortfalls)) => {
                    info!(short_variants = shortfalls.len(), "order rejected: insufficient inventory");
                    return Err(PlacementError::InsufficientInventory(shortfalls));
                }
                Err(StoreError::DeadlineExceeded) => return Err(self.deadline_exceeded()),
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn deadline_exceeded(&self) -> PlacementError {
        warn!(deadline_ms = self.deadline.as_millis() as u64, "order placement deadline exceeded");
        PlacementError::Transaction("deadline exceeded".to_string())
    }

    pub async fn get(&self, order_id: OrderId) -> Result<Order, PlacementError> {
        self.store
            .fetch_order(order_id)
            .await?
            .ok_or(PlacementError::NotFound)
    }

    /// One page of orders (newest first) and its metadata; metadata is `None` when
    /// nothing matched.
    pub async fn list(
        &self,
        search: Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<Order>, Option<PageMeta>), PlacementError> {
        let query = OrderQuery::new(search, page);
        let result = self.store.list_orders(&query).await?;
        Ok((result.orders, PageMeta::from_total(result.total, page)))
    }
}
