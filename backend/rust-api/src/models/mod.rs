use serde::Deserialize;

pub mod achievement;
pub mod attempt;
pub mod quiz;
pub mod topic;
pub mod user;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Common `?page=&limit=` query parameters for paginated listings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    /// Resolves to (page, limit, skip) with out-of-range values clamped.
    pub fn resolve(&self) -> (i64, i64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let skip = ((page - 1) * limit) as u64;
        (page, limit, skip)
    }

    /// Total page count for `total` matching documents.
    pub fn total_pages(total: u64, limit: i64) -> u64 {
        total.div_ceil(limit as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_defaults() {
        let query = PageQuery {
            page: None,
            limit: None,
        };
        assert_eq!(query.resolve(), (1, DEFAULT_PAGE_SIZE, 0));
    }

    #[test]
    fn resolve_clamps_out_of_range_values() {
        let query = PageQuery {
            page: Some(0),
            limit: Some(10_000),
        };
        assert_eq!(query.resolve(), (1, MAX_PAGE_SIZE, 0));
    }

    #[test]
    fn resolve_computes_skip() {
        let query = PageQuery {
            page: Some(3),
            limit: Some(20),
        };
        assert_eq!(query.resolve(), (3, 20, 40));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(PageQuery::total_pages(21, 10), 3);
        assert_eq!(PageQuery::total_pages(20, 10), 2);
        assert_eq!(PageQuery::total_pages(0, 10), 0);
    }
}
