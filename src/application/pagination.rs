//! Offset pagination over listing queries.
//!
//! Listings fetch a `COUNT(*)` first and then a single `LIMIT/OFFSET` window,
//! so the paginator only needs the total to resolve which window to load.
//! Requested page numbers never fail: anything unparsable resolves to the
//! first page and anything past the end resolves to the last.

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    per_page: u32,
    orphans: u32,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            per_page: DEFAULT_PAGE_SIZE,
            orphans: 0,
        }
    }
}

/// Resolved slice of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u32,
    pub num_pages: u32,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

impl Paginator {
    /// `per_page` below one is treated as one; orphans are capped below `per_page`.
    pub fn new(per_page: u32, orphans: u32) -> Self {
        let per_page = per_page.max(1);
        Self {
            per_page,
            orphans: orphans.min(per_page - 1),
        }
    }

    pub fn num_pages(&self, total: u64) -> u32 {
        let per_page = u64::from(self.per_page);
        let counted = total.saturating_sub(u64::from(self.orphans));
        let pages = counted.div_ceil(per_page).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    pub fn resolve(&self, total: u64, requested: Option<&str>) -> PageWindow {
        let num_pages = self.num_pages(total);
        let number = match requested.map(str::trim).and_then(|raw| raw.parse::<i64>().ok()) {
            Some(value) if value < 1 => 1,
            Some(value) => u32::try_from(value).unwrap_or(u32::MAX).min(num_pages),
            None => 1,
        };

        let per_page = u64::from(self.per_page);
        let offset = u64::from(number - 1) * per_page;
        let limit = if number == num_pages {
            // Last page absorbs trailing orphans.
            per_page + u64::from(self.orphans)
        } else {
            per_page
        };

        PageWindow {
            number,
            num_pages,
            total,
            offset,
            limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub num_pages: u32,
    pub total: u64,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_number: Option<u32>,
    pub previous_number: Option<u32>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, window: PageWindow) -> Self {
        let has_next = window.number < window.num_pages;
        let has_previous = window.number > 1;
        Self {
            items,
            number: window.number,
            num_pages: window.num_pages,
            total: window.total,
            has_next,
            has_previous,
            next_number: has_next.then_some(window.number + 1),
            previous_number: has_previous.then(|| window.number - 1),
        }
    }
}
