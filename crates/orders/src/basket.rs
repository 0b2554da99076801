//! Baskets, per-variant demand and the availability verdict.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use stockline_core::{DomainResult, Money, VariantId};

/// One requested line: variant, quantity and the unit price captured at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketLine {
    pub variant_id: VariantId,
    pub quantity: i64,
    /// Unit price in minor currency units.
    pub price: Money,
}

impl BasketLine {
    pub fn new(variant_id: VariantId, quantity: i64, price: Money) -> Self {
        Self {
            variant_id,
            quantity,
            price,
        }
    }

    pub fn subtotal(&self) -> DomainResult<Money> {
        self.price.times(self.quantity)
    }
}

/// Ordered sequence of lines a caller wishes to purchase in one order.
///
/// Line order is preserved; it is the order items are persisted in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Basket {
    lines: Vec<BasketLine>,
}

impl Basket {
    pub fn new(lines: Vec<BasketLine>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[BasketLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Σ(quantity × price) over all lines.
    pub fn subtotal(&self) -> DomainResult<Money> {
        self.lines
            .iter()
            .try_fold(Money::ZERO, |acc, line| acc.checked_add(line.subtotal()?))
    }

    /// Fold lines into one requested quantity per distinct variant.
    ///
    /// Two lines for the same variant must be checked and decremented as their sum,
    /// otherwise each line could pass against the same remaining stock.
    pub fn demand(&self) -> Demand {
        let mut by_variant = BTreeMap::new();
        for line in &self.lines {
            let entry = by_variant.entry(line.variant_id).or_insert(0_i64);
            *entry = entry.saturating_add(line.quantity);
        }
        Demand(by_variant)
    }
}

impl FromIterator<BasketLine> for Basket {
    fn from_iter<I: IntoIterator<Item = BasketLine>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Requested quantity per distinct variant, ordered by variant id.
///
/// The ordering doubles as the lock acquisition order in stores that lock rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Demand(BTreeMap<VariantId, i64>);

impl Demand {
    pub fn get(&self, variant_id: &VariantId) -> Option<i64> {
        self.0.get(variant_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VariantId, i64)> + '_ {
        self.0.iter().map(|(id, qty)| (*id, *qty))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A demand line that cannot be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub variant_id: VariantId,
    pub requested: i64,
    /// Remaining quantity at evaluation time; `None` when the variant does not exist.
    pub remaining: Option<i64>,
}

/// Sufficiency verdict for a whole basket (all-or-nothing, no partial fulfilment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Sufficient,
    Insufficient(Vec<Shortfall>),
}

impl Availability {
    /// Evaluate `demand` against a snapshot of remaining quantities.
    ///
    /// A line is satisfiable iff its variant is present in `remaining` with a quantity
    /// at least the requested amount. Shortfalls are reported in variant id order.
    pub fn evaluate(demand: &Demand, remaining: &HashMap<VariantId, i64>) -> Self {
        let shortfalls: Vec<Shortfall> = demand
            .iter()
            .filter_map(|(variant_id, requested)| {
                let left = remaining.get(&variant_id).copied();
                match left {
                    Some(q) if q >= requested => None,
                    _ => Some(Shortfall {
                        variant_id,
                        requested,
                        remaining: left,
                    }),
                }
            })
            .collect();

        if shortfalls.is_empty() {
            Availability::Sufficient
        } else {
            Availability::Insufficient(shortfalls)
        }
    }

    pub fn is_sufficient(&self) -> bool {
        matches!(self, Availability::Sufficient)
    }

    pub fn into_shortfalls(self) -> Vec<Shortfall> {
        match self {
            Availability::Sufficient => Vec::new(),
            Availability::Insufficient(s) => s,
        }
    }
}
