//! Page-number pagination.
//!
//! Feeds are paginated by 1-indexed page number. A requested page past the
//! end resolves to the last page and anything unparsable resolves to the
//! first one, so a page request never fails.

use serde::{Deserialize, Serialize};

/// A requested page, before the total item count is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Requested page number (1-indexed, never zero).
    pub number: u64,
    /// Items per page (never zero).
    pub per_page: u64,
}

impl PageRequest {
    /// Create a page request. Zero values are raised to one.
    #[must_use]
    pub fn new(number: u64, per_page: u64) -> Self {
        Self {
            number: number.max(1),
            per_page: per_page.max(1),
        }
    }

    /// Build a request from a raw `?page=` query value.
    #[must_use]
    pub fn from_param(raw: Option<&str>, per_page: u64) -> Self {
        let number = raw
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(1);
        Self::new(number, per_page)
    }

    /// Resolve against the total number of items, clamping to the last page.
    #[must_use]
    pub fn resolve(&self, total_count: u64) -> PageInfo {
        let total_pages = total_count.div_ceil(self.per_page).max(1);
        let number = self.number.min(total_pages);

        PageInfo {
            number,
            per_page: self.per_page,
            total_count,
            total_pages,
            has_next: number < total_pages,
            has_previous: number > 1,
        }
    }
}

/// Pagination metadata for a resolved page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Current page number (1-indexed).
    pub number: u64,
    /// Items per page.
    pub per_page: u64,
    /// Items across all pages.
    pub total_count: u64,
    /// Number of pages, at least one even when there are no items.
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PageInfo {
    /// Offset of the first item on this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.number - 1) * self.per_page
    }

    /// Number of items on this page.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.total_count
            .saturating_sub(self.offset())
            .min(self.per_page)
    }
}

/// A page of items with its pagination metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Page<T> {
    /// Create a page.
    #[must_use]
    pub const fn new(items: Vec<T>, pagination: PageInfo) -> Self {
        Self { items, pagination }
    }

    /// An empty single page.
    #[must_use]
    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), request.resolve(0))
    }

    /// Transform the items, keeping the metadata.
    #[must_use]
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}
