//! Page requests and the paginated response envelope.

use serde::Serialize;

use crate::error::{DomainError, DomainResult};

/// Upper bound for `pageSize`; larger requests are clamped.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A validated 1-based page request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    /// Build a page request from optional raw query values.
    ///
    /// Missing values fall back to page 1 and `default_size`.
    pub fn new(page: Option<u32>, page_size: Option<u32>, default_size: u32) -> DomainResult<Self> {
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(default_size);
        if page < 1 {
            return Err(DomainError::validation("page must be >= 1"));
        }
        if page_size < 1 {
            return Err(DomainError::validation("pageSize must be >= 1"));
        }
        Ok(Self {
            page,
            page_size: page_size.min(MAX_PAGE_SIZE),
        })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of items to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

/// Paginated response envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub total_items: u64,
    pub total_pages: u64,
    pub prev_page: bool,
    pub next_page: bool,
    pub data: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total_items: u64, request: PageRequest) -> Self {
        let total_pages = total_items.div_ceil(u64::from(request.page_size));
        let page = u64::from(request.page);
        Self {
            total_items,
            total_pages,
            prev_page: page > 1,
            next_page: page < total_pages,
            data,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            total_items: self.total_items,
            total_pages: self.total_pages,
            prev_page: self.prev_page,
            next_page: self.next_page,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_apply_when_missing() {
        let req = PageRequest::new(None, None, 25).unwrap();
        assert_eq!(req.page(), 1);
        assert_eq!(req.page_size(), 25);
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn zero_page_is_rejected() {
        assert!(PageRequest::new(Some(0), None, 25).is_err());
        assert!(PageRequest::new(None, Some(0), 25).is_err());
    }

    #[test]
    fn page_size_is_clamped() {
        let req = PageRequest::new(Some(2), Some(10_000), 25).unwrap();
        assert_eq!(req.page_size(), MAX_PAGE_SIZE);
        assert_eq!(req.offset(), u64::from(MAX_PAGE_SIZE));
    }

    #[test]
    fn empty_result_has_no_pages() {
        let req = PageRequest::new(Some(1), Some(10), 10).unwrap();
        let page: Paginated<u8> = Paginated::new(vec![], 0, req);
        assert_eq!(page.total_pages, 0);
        assert!(!page.prev_page);
        assert!(!page.next_page);
    }

    #[test]
    fn envelope_serializes_camel_case() {
        let req = PageRequest::new(Some(1), Some(1), 10).unwrap();
        let json = serde_json::to_value(Paginated::new(vec![1], 2, req)).unwrap();
        assert_eq!(json["totalItems"], 2);
        assert_eq!(json["totalPages"], 2);
        assert_eq!(json["prevPage"], false);
        assert_eq!(json["nextPage"], true);
    }

    proptest! {
        #[test]
        fn envelope_arithmetic_holds(total in 0u64..10_000, page in 1u32..500, size in 1u32..=100) {
            let req = PageRequest::new(Some(page), Some(size), 25).unwrap();
            let p: Paginated<()> = Paginated::new(vec![], total, req);

            prop_assert_eq!(p.total_pages, total.div_ceil(u64::from(size)));
            prop_assert!(p.total_pages * u64::from(size) >= total);
            prop_assert_eq!(p.prev_page, page > 1);
            prop_assert_eq!(p.next_page, u64::from(page) < p.total_pages);
        }
    }
}
