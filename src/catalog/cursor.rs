//! Persisted crawler cursor.

use sqlx::FromRow;

/// The single `(initial_page_count, last_fetched_page)` record anchoring the indexer.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CrawlerCursor {
    /// Page-count snapshot; re-anchored whenever drift is detected.
    pub initial_page_count: i64,
    /// Last page indexed, `None` until the first page has been processed.
    pub last_fetched_page: Option<i64>,
    /// When the cursor last changed.
    pub updated_at: String,
}

impl CrawlerCursor {
    /// Builds a cursor value without touching the store.
    #[must_use]
    pub fn new(initial_page_count: i64, last_fetched_page: Option<i64>) -> Self {
        Self {
            initial_page_count,
            last_fetched_page,
            updated_at: String::new(),
        }
    }
}
