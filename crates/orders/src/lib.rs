//! Order domain module.
//!
//! This crate contains the business rules for placing orders against finite
//! inventory, implemented purely as deterministic domain logic (no IO, no HTTP,
//! no storage). The transactional execution lives in `stockline-infra`.

pub mod basket;
pub mod order;
pub mod page;
pub mod variant;

pub use basket::{Availability, Basket, BasketLine, Demand, Shortfall};
pub use order::{FieldViolation, NewOrder, Order, OrderItem, OrderReceipt, OrderStatus};
pub use page::{PageMeta, PageRequest, DEFAULT_LIMIT, DEFAULT_PAGE, MAX_LIMIT};
pub use variant::Variant;
