//! Pagination utilities
//!
//! List endpoints accept `page` (1-indexed, default 1) and `page_size`
//! (default 20, clamped to 1..=100) and respond with a [`Page`].

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    pub page_size: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Normalize the requested page size
pub fn clamp_page_size(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// Calculate pagination metadata from total results and requested page
///
/// Ensures page is within valid bounds [1, total_pages]
///
/// # Examples
/// ```
/// use commune_api::pagination::calculate_pagination;
///
/// // 45 results, 20 per page = 3 pages
/// let p = calculate_pagination(45, Some(2), None);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 20);
/// ```
pub fn calculate_pagination(
    total_results: i64,
    requested_page: Option<i64>,
    requested_page_size: Option<i64>,
) -> Pagination {
    let page_size = clamp_page_size(requested_page_size);
    let total_pages = (total_results + page_size - 1) / page_size;
    let page = requested_page.unwrap_or(1).max(1).min(total_pages.max(1));
    let offset = (page - 1) * page_size;

    Pagination {
        page,
        page_size,
        total_pages,
        offset,
    }
}

/// Paginated list response
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
            total_pages: pagination.total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults() {
        let p = calculate_pagination(45, None, None);
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, 20);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_last_page() {
        let p = calculate_pagination(45, Some(3), None);
        assert_eq!(p.offset, 40);
    }

    #[test]
    fn test_page_size_clamped() {
        assert_eq!(calculate_pagination(10, None, Some(0)).page_size, 1);
        assert_eq!(calculate_pagination(10, None, Some(-5)).page_size, 1);
        assert_eq!(calculate_pagination(10, None, Some(500)).page_size, 100);
    }

    #[test]
    fn test_pagination_out_of_bounds_low() {
        let p = calculate_pagination(150, Some(0), Some(50));
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_out_of_bounds_high() {
        let p = calculate_pagination(45, Some(99), None);
        assert_eq!(p.page, 3); // Clamped to last page
        assert_eq!(p.offset, 40);
    }

    #[test]
    fn test_pagination_empty() {
        let p = calculate_pagination(0, None, None);
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_page_map() {
        let page = Page::new(vec![1, 2], 2, calculate_pagination(2, None, None));
        let mapped = page.map(|n| n * 10);
        assert_eq!(mapped.items, vec![10, 20]);
        assert_eq!(mapped.total, 2);
    }
}
