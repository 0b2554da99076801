//! Page-number pagination and the metadata block derived from a match count.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Normalised page request (1-based page number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    /// Out-of-range values fall back to the defaults: page < 1 becomes 1, and a limit
    /// outside `1..=MAX_LIMIT` becomes `DEFAULT_LIMIT`.
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(DEFAULT_PAGE);
        let limit = limit
            .filter(|l| (1..=MAX_LIMIT).contains(l))
            .unwrap_or(DEFAULT_LIMIT);
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Pagination metadata for a listing response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub total: i64,
    pub per_page: i64,
    pub current_page: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<i64>,
}

impl PageMeta {
    /// Returns `None` when nothing matched.
    pub fn from_total(total: i64, request: PageRequest) -> Option<Self> {
        if total < 1 {
            return None;
        }
        let next = (request.page.saturating_mul(request.limit) < total).then(|| request.page + 1);
        let prev = (request.page > 1).then(|| request.page - 1);
        Some(Self {
            total,
            per_page: request.limit,
            current_page: request.page,
            next,
            prev,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_values_fall_back_to_defaults() {
        assert_eq!(PageRequest::new(None, None), PageRequest::default());
        assert_eq!(PageRequest::new(Some(0), Some(0)), PageRequest { page: 1, limit: 10 });
        assert_eq!(PageRequest::new(Some(-3), Some(101)), PageRequest { page: 1, limit: 10 });
        assert_eq!(PageRequest::new(Some(3), Some(100)), PageRequest { page: 3, limit: 100 });
    }

    #[test]
    fn offset_is_zero_based() {
        assert_eq!(PageRequest::new(Some(1), Some(10)).offset(), 0);
        assert_eq!(PageRequest::new(Some(2), Some(10)).offset(), 10);
    }

    #[test]
    fn fifteen_orders_in_pages_of_ten() {
        let first = PageMeta::from_total(15, PageRequest::new(Some(1), Some(10))).unwrap();
        assert_eq!(first.total, 15);
        assert_eq!(first.next, Some(2));
        assert_eq!(first.prev, None);

        let second = PageMeta::from_total(15, PageRequest::new(Some(2), Some(10))).unwrap();
        assert_eq!(second.next, None);
        assert_eq!(second.prev, Some(1));
    }

    #[test]
    fn no_matches_yields_no_metadata() {
        assert_eq!(PageMeta::from_total(0, PageRequest::default()), None);
    }

    #[test]
    fn absent_links_are_omitted_from_json() {
        let meta = PageMeta::from_total(5, PageRequest::default()).unwrap();
        let json = serde_json::to_value(meta).unwrap();
        assert!(json.get("next").is_none());
        assert!(json.get("prev").is_none());
        assert_eq!(json["per_page"], 10);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: walking `next` links visits every page exactly once.
            #[test]
            fn next_links_cover_all_matches(total in 1i64..500, limit in 1i64..=MAX_LIMIT) {
                let mut page = 1;
                let mut seen = 0;
                loop {
                    let req = PageRequest::new(Some(page), Some(limit));
                    let meta = PageMeta::from_total(total, req).unwrap();
                    seen += (total - req.offset()).min(limit);
                    match meta.next {
                        Some(n) => page = n,
                        None => break,
                    }
                }
                prop_assert_eq!(seen, total);
            }
        }
    }
}
