//! Transactional order storage boundary.
//!
//! Placement runs as a single unit of work per order; reads reconstruct orders from
//! their persisted header and item rows.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::{FailPoint, InMemoryOrderStore};
pub use postgres::PostgresOrderStore;
pub use query::{OrderPage, OrderQuery};
pub use r#trait::{OrderStore, StoreError};
