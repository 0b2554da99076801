//! `stockline-core` — shared primitives for the order-placement engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod value_object;

pub use error::{DomainError, DomainResult};
pub use id::{OrderId, ProductId, VariantId};
pub use value_object::Money;
