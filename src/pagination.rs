use serde::{Deserialize, Serialize};

/// Query parameters shared by every paginated listing.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

impl PageQuery {
    /// Normalized 1-based page number. Values below 1 clamp to the first page;
    /// values past the end of the collection are handled by `Page::new`.
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }
}

/// LIMIT/OFFSET bounds for a 1-based page number.
pub fn slice_bounds(page: i64, per_page: i64) -> (i64, i64) {
    (per_page, (page.max(1) - 1) * per_page)
}

/// A page-sliced view over an ordered collection.
///
/// Out-of-range pages are not an error: they carry an empty item slice and
/// report neither a next nor a previous page, so navigation that overshoots
/// simply renders empty instead of failing.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub has_next: bool,
    pub has_prev: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_page: Option<i64>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: i64, per_page: i64, total: i64) -> Self {
        let last = if total == 0 {
            1
        } else {
            (total + per_page - 1) / per_page
        };
        let in_range = page >= 1 && page <= last;
        let has_next = in_range && page < last;
        let has_prev = in_range && page > 1;
        Page {
            items,
            page,
            per_page,
            total,
            has_next,
            has_prev,
            next_page: has_next.then(|| page + 1),
            prev_page: has_prev.then(|| page - 1),
        }
    }
}
