//! List pagination
//!
//! Page/limit query parameters and the list envelope shared by every
//! collection endpoint.

use serde::{Deserialize, Serialize};

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;

/// Query parameters for paginated list endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    DEFAULT_PAGE
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl PageQuery {
    /// Page number clamped to at least 1
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    /// Page size clamped to 1..=100
    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, MAX_LIMIT)
    }

    /// OFFSET for the SQL query
    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Envelope for paginated list responses
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub total_results: i64,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, query: &PageQuery, total_results: i64) -> Self {
        let limit = query.limit();
        let total_pages = if total_results == 0 {
            0
        } else {
            (total_results + limit - 1) / limit
        };
        Self {
            results,
            page: query.page(),
            limit,
            total_pages,
            total_results,
        }
    }
}
