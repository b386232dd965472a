use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 20 }

impl PaginationParams {
    pub fn offset(&self) -> u64 {
        (self.page.saturating_sub(1)) * self.limit()
    }

    pub fn limit(&self) -> u64 {
        self.per_page.clamp(1, 100)
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 20 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, params: &PaginationParams) -> Self {
        let per_page = params.limit();
        let total_pages = total.div_ceil(per_page);
        Self {
            items,
            total,
            page: params.page,
            per_page,
            total_pages,
        }
    }
}

/// Keyset page over a time-ordered log, newest first. `next_cursor` is the
/// timestamp to pass as `before` for the following page.
#[derive(Debug, Serialize, Deserialize)]
pub struct CursorPage<T: Serialize> {
    pub items: Vec<T>,
    pub next_cursor: Option<DateTime<Utc>>,
}

impl<T: Serialize> CursorPage<T> {
    /// `limit` is the page size that was requested; a short page means the log is exhausted.
    pub fn new(items: Vec<T>, limit: usize, cursor_of: impl Fn(&T) -> DateTime<Utc>) -> Self {
        let next_cursor = if items.len() >= limit {
            items.last().map(cursor_of)
        } else {
            None
        };
        Self { items, next_cursor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_and_total_pages() {
        let params = PaginationParams { page: 3, per_page: 10 };
        assert_eq!(params.offset(), 20);
        let page = Paginated::new(vec![1, 2], 21, &params);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn oversized_pages_are_capped() {
        let params = PaginationParams { page: 1, per_page: 5000 };
        assert_eq!(params.limit(), 100);
    }

    #[test]
    fn short_cursor_page_has_no_next_cursor() {
        let now = Utc::now();
        let full = CursorPage::new(vec![now, now], 2, |t| *t);
        assert_eq!(full.next_cursor, Some(now));
        let short = CursorPage::new(vec![now], 2, |t| *t);
        assert!(short.next_cursor.is_none());
    }
}
