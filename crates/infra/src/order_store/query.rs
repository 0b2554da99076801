//! Order listing query and result.
//!
//! Listing is page-number based at the API; stores only see a limit/offset window.

use serde::{Deserialize, Serialize};

use stockline_orders::{Order, PageRequest};

/// Filter + window for order listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQuery {
    /// Free-text, case-insensitive substring filter on product name.
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl OrderQuery {
    /// Build a query from a normalised page request. Blank searches match everything.
    pub fn new(search: Option<String>, page: PageRequest) -> Self {
        let search = search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self {
            search,
            limit: page.limit,
            offset: page.offset(),
        }
    }

    /// `ILIKE` pattern for the search term, with LIKE metacharacters escaped.
    pub fn like_pattern(&self) -> Option<String> {
        self.search.as_deref().map(|s| {
            let mut escaped = String::with_capacity(s.len() + 2);
            escaped.push('%');
            for c in s.chars() {
                if matches!(c, '%' | '_' | '\\') {
                    escaped.push('\\');
                }
                escaped.push(c);
            }
            escaped.push('%');
            escaped
        })
    }
}

/// One page of orders and the total number of matching orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: i64,
}
